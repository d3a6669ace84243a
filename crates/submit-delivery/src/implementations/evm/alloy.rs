//! Alloy-based EVM chain provider.
//!
//! Signs with a wallet built from the chain account's private key and talks
//! to the chain over HTTP. Nonce, gas and fee fields are filled from the
//! node when the transaction is signed, unless the transaction carries hints.

use crate::{ChainProvider, ChainProviderFactory, ProviderError, SignedTransaction};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{keccak256, Address, FixedBytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use submit_types::{
	without_0x_prefix, ChainMetadata, ImplementationRegistry, ProtocolType, SecretString,
	TransactionHash, TransactionReceipt, TransactionValue,
};
use tokio::time::Instant;

/// EVM chain provider on an alloy HTTP provider.
pub struct AlloyChainProvider {
	chain_id: u64,
	signer_address: Address,
	wallet: EthereumWallet,
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	poll_interval: Duration,
}

impl AlloyChainProvider {
	/// Creates a provider for `metadata` signing with `private_key`.
	pub fn new(metadata: &ChainMetadata, private_key: &SecretString) -> Result<Self, ProviderError> {
		let signer: PrivateKeySigner = private_key.with_exposed(|key| {
			PrivateKeySigner::from_str(without_0x_prefix(key))
				.map_err(|_| ProviderError::InvalidTransaction("Invalid private key format".into()))
		})?;
		let signer_address = signer.address();

		let url = metadata.rpc_url.parse().map_err(|e| {
			ProviderError::Rejected(format!("Invalid RPC URL '{}': {}", metadata.rpc_url, e))
		})?;

		let wallet = EthereumWallet::from(signer.with_chain_id(Some(metadata.chain_id)));
		let provider = ProviderBuilder::new().on_http(url);

		Ok(Self {
			chain_id: metadata.chain_id,
			signer_address,
			wallet,
			provider: Arc::new(provider) as Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
			poll_interval: Duration::from_secs(2),
		})
	}

	fn request(&self, tx: &TransactionValue) -> Result<TransactionRequest, ProviderError> {
		let to = Address::from_str(&tx.to)
			.map_err(|e| ProviderError::InvalidTransaction(format!("Invalid to address: {}", e)))?;

		let mut request = TransactionRequest::default()
			.from(self.signer_address)
			.to(to)
			.input(tx.data.clone().into())
			.value(tx.value);
		if let Some(gas_limit) = tx.hints.gas_limit {
			request = request.gas_limit(gas_limit);
		}
		if let Some(nonce) = tx.hints.nonce {
			request = request.nonce(nonce);
		}
		Ok(request)
	}

	/// Fills the fields the transaction hints leave open.
	async fn fill(&self, tx: &TransactionValue) -> Result<TransactionRequest, ProviderError> {
		let mut request = self.request(tx)?.with_chain_id(self.chain_id);
		if tx.hints.nonce.is_none() {
			let nonce = self
				.provider
				.get_transaction_count(self.signer_address)
				.pending()
				.await
				.map_err(|e| classify("Failed to get nonce", e))?;
			request.set_nonce(nonce);
		}
		if tx.hints.gas_limit.is_none() {
			let gas = self
				.provider
				.estimate_gas(&request)
				.await
				.map_err(|e| classify("Failed to estimate gas", e))?;
			request.set_gas_limit(gas);
		}
		let fees = self
			.provider
			.estimate_eip1559_fees(None)
			.await
			.map_err(|e| classify("Failed to estimate fees", e))?;
		request.set_max_fee_per_gas(fees.max_fee_per_gas);
		request.set_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);
		Ok(request)
	}
}

/// Transport failures are retryable; anything the node answered is not.
fn classify(context: &str, error: alloy_transport::TransportError) -> ProviderError {
	let message = format!("{}: {}", context, error);
	if error.is_transport_error() {
		ProviderError::Transient(message)
	} else {
		ProviderError::Rejected(message)
	}
}

#[async_trait]
impl ChainProvider for AlloyChainProvider {
	fn protocol(&self) -> ProtocolType {
		ProtocolType::Ethereum
	}

	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	fn signer_address(&self) -> String {
		self.signer_address.to_checksum(None)
	}

	fn validate_transaction(&self, tx: &TransactionValue) -> Result<(), ProviderError> {
		self.request(tx).map(|_| ())
	}

	async fn sign_transaction(
		&self,
		tx: &TransactionValue,
	) -> Result<SignedTransaction, ProviderError> {
		let request = self.fill(tx).await?;
		let envelope = request
			.build(&self.wallet)
			.await
			.map_err(|e| ProviderError::InvalidTransaction(format!("Failed to sign: {}", e)))?;

		let raw = envelope.encoded_2718();
		Ok(SignedTransaction {
			hash: TransactionHash(keccak256(&raw).to_vec()),
			raw: raw.into(),
		})
	}

	async fn broadcast(&self, signed: &SignedTransaction) -> Result<TransactionHash, ProviderError> {
		let error = match self.provider.send_raw_transaction(&signed.raw).await {
			Ok(pending_tx) => return Ok(TransactionHash(pending_tx.tx_hash().0.to_vec())),
			Err(e) => e,
		};

		// A resend of a transaction the node already holds is not a failure.
		let tx_hash = FixedBytes::<32>::from_slice(&signed.hash.0);
		if let Ok(Some(_)) = self.provider.get_transaction_by_hash(tx_hash).await {
			tracing::debug!(tx_hash = %signed.hash, "Node already knows the transaction");
			return Ok(signed.hash.clone());
		}
		Err(classify("Failed to send transaction", error))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
		timeout: Duration,
	) -> Result<TransactionReceipt, ProviderError> {
		if hash.0.len() != 32 {
			return Err(ProviderError::InvalidTransaction(format!(
				"Invalid transaction hash {}",
				hash
			)));
		}
		let tx_hash = FixedBytes::<32>::from_slice(&hash.0);
		let deadline = Instant::now() + timeout;

		tracing::debug!(tx_hash = %hash, confirmations, timeout_secs = timeout.as_secs(), "Waiting for confirmations");

		loop {
			if Instant::now() >= deadline {
				return Err(ProviderError::Timeout(format!(
					"{} did not reach {} confirmations within {}s",
					hash,
					confirmations,
					timeout.as_secs()
				)));
			}

			let receipt = match self.provider.get_transaction_receipt(tx_hash).await {
				Ok(Some(receipt)) => receipt,
				Ok(None) => {
					tokio::time::sleep(self.poll_interval).await;
					continue;
				},
				Err(e) => return Err(classify("Failed to get receipt", e)),
			};

			let current_block = self
				.provider
				.get_block_number()
				.await
				.map_err(|e| classify("Failed to get block number", e))?;

			// The inclusion block counts as the first confirmation.
			let tx_block = receipt.block_number.unwrap_or(current_block);
			let current_confirmations = current_block.saturating_sub(tx_block) + 1;

			if current_confirmations >= confirmations {
				return Ok(TransactionReceipt {
					hash: TransactionHash(receipt.transaction_hash.0.to_vec()),
					block_number: tx_block,
					success: receipt.status(),
				});
			}

			tracing::debug!(
				tx_hash = %hash,
				remaining = confirmations.saturating_sub(current_confirmations),
				"Waiting for more confirmations"
			);
			tokio::time::sleep(self.poll_interval).await;
		}
	}

	async fn estimate_gas(&self, tx: &TransactionValue) -> Result<u64, ProviderError> {
		let request = self.request(tx)?;
		self.provider
			.estimate_gas(&request)
			.await
			.map_err(|e| classify("Failed to estimate gas", e))
	}
}

/// Factory function to create an EVM chain provider.
pub fn create_provider(
	metadata: &ChainMetadata,
	private_key: &SecretString,
) -> Result<Box<dyn ChainProvider>, ProviderError> {
	if metadata.protocol != ProtocolType::Ethereum {
		return Err(ProviderError::Rejected(format!(
			"The alloy provider cannot serve {} chains",
			metadata.protocol
		)));
	}
	Ok(Box::new(AlloyChainProvider::new(metadata, private_key)?))
}

/// Registry for the alloy EVM provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "ethereum";
	type Factory = ChainProviderFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::ChainProviderRegistry for Registry {}
