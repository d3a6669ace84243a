//! Multisig proposal service.
//!
//! Proposals are queued on a Safe transaction service, where the remaining
//! owners add their signatures until the threshold is met and the Safe
//! transaction can be executed.

use crate::ProviderError;
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A signed Safe transaction submitted for co-signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeProposal {
	pub safe: String,
	pub to: String,
	/// Value in wei, as a decimal string.
	pub value: String,
	/// Call data, `0x`-prefixed hex.
	pub data: String,
	pub operation: u8,
	pub safe_tx_gas: String,
	pub base_gas: String,
	pub gas_price: String,
	pub gas_token: String,
	pub refund_receiver: String,
	pub nonce: u64,
	/// EIP-712 hash of the Safe transaction, the proposal id.
	pub contract_transaction_hash: String,
	/// Owner address that signed the proposal.
	pub sender: String,
	/// 65-byte owner signature, `0x`-prefixed hex.
	pub signature: String,
	pub origin: String,
}

/// Trait defining the interface to a multisig proposal queue.
#[async_trait]
pub trait ProposalService: Send + Sync {
	/// Next unused Safe nonce: past the on-chain nonce and every proposal
	/// still queued for execution.
	async fn next_nonce(&self, safe: Address) -> Result<u64, ProviderError>;

	/// Queues a signed proposal.
	async fn propose(&self, proposal: &SafeProposal) -> Result<(), ProviderError>;
}

/// Client for the Safe transaction service HTTP API.
pub struct SafeTransactionService {
	base_url: String,
	client: reqwest::Client,
}

#[derive(Deserialize)]
struct SafeInfo {
	nonce: serde_json::Value,
}

#[derive(Deserialize)]
struct QueuedPage {
	results: Vec<SafeInfo>,
}

/// The service reports nonces as numbers or decimal strings.
fn parse_nonce(value: &serde_json::Value) -> Result<u64, ProviderError> {
	match value {
		serde_json::Value::Number(n) => n.as_u64(),
		serde_json::Value::String(s) => s.parse().ok(),
		_ => None,
	}
	.ok_or_else(|| ProviderError::Rejected(format!("Invalid Safe nonce: {}", value)))
}

/// First nonce after the on-chain one that no queued proposal holds.
fn next_free_nonce(onchain: u64, highest_queued: Option<u64>) -> u64 {
	match highest_queued {
		Some(queued) if queued >= onchain => queued + 1,
		_ => onchain,
	}
}

impl SafeTransactionService {
	pub fn new(base_url: &str) -> Result<Self, ProviderError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.map_err(|e| ProviderError::Rejected(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			base_url: base_url.trim_end_matches('/').to_string(),
			client,
		})
	}

	fn safe_url(&self, safe: &Address, path: &str) -> String {
		format!(
			"{}/api/v1/safes/{}/{}",
			self.base_url,
			safe.to_checksum(None),
			path
		)
	}
}

/// Connection-level failures are transient.
fn classify_request_error(e: reqwest::Error) -> ProviderError {
	if e.is_timeout() || e.is_connect() || e.is_request() {
		ProviderError::Transient(e.to_string())
	} else {
		ProviderError::Rejected(e.to_string())
	}
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}

	let body = response.text().await.unwrap_or_default();
	let message = format!("Safe service answered {}: {}", status, body);
	if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
		Err(ProviderError::Transient(message))
	} else {
		Err(ProviderError::Rejected(message))
	}
}

#[async_trait]
impl ProposalService for SafeTransactionService {
	async fn next_nonce(&self, safe: Address) -> Result<u64, ProviderError> {
		let response = self
			.client
			.get(self.safe_url(&safe, ""))
			.send()
			.await
			.map_err(classify_request_error)?;

		let info: SafeInfo = check_status(response)
			.await?
			.json()
			.await
			.map_err(|e| ProviderError::Rejected(format!("Invalid Safe info: {}", e)))?;
		let onchain = parse_nonce(&info.nonce)?;

		let queued_path = format!(
			"multisig-transactions/?executed=false&nonce__gte={}&ordering=-nonce&limit=1",
			onchain
		);
		let response = self
			.client
			.get(self.safe_url(&safe, &queued_path))
			.send()
			.await
			.map_err(classify_request_error)?;

		let page: QueuedPage = check_status(response)
			.await?
			.json()
			.await
			.map_err(|e| ProviderError::Rejected(format!("Invalid proposal queue: {}", e)))?;
		let highest_queued = match page.results.first() {
			Some(queued) => Some(parse_nonce(&queued.nonce)?),
			None => None,
		};

		let nonce = next_free_nonce(onchain, highest_queued);
		tracing::debug!(safe = %safe, onchain, nonce, "Resolved next Safe nonce");
		Ok(nonce)
	}

	async fn propose(&self, proposal: &SafeProposal) -> Result<(), ProviderError> {
		let safe: Address = proposal
			.safe
			.parse()
			.map_err(|e| ProviderError::InvalidTransaction(format!("Invalid Safe address: {}", e)))?;

		tracing::debug!(safe = %proposal.safe, nonce = proposal.nonce, "Posting Safe proposal");

		let response = self
			.client
			.post(self.safe_url(&safe, "multisig-transactions/"))
			.json(proposal)
			.send()
			.await
			.map_err(classify_request_error)?;

		check_status(response).await.map(|_| ())
	}
}
