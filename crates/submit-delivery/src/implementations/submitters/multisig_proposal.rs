//! Multisig proposal submitter.
//!
//! Nothing is executed on chain. Each transaction becomes a Safe transaction
//! proposal signed by the chain account; the receipt is the proposal id (the
//! EIP-712 Safe transaction hash) and execution waits for the remaining
//! owners to reach the threshold.

use crate::dispatch::{check_chain, evm_address, retry_error};
use crate::proposal::SafeTransactionService;
use crate::{
	ChainRuntime, ProposalService, SafeProposal, SubmitMode, SubmitterError, SubmitterFactory,
	SubmitterInterface, SubmitterRegistry,
};
use alloy_primitives::{hex, Address, B256, U256};
use alloy_sol_types::{eip712_domain, sol, SolStruct};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use submit_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, ProtocolType, Receipt, ReceiptOutcome,
	Schema, StagedTransaction, ValidationError,
};
use tracing::{error, info};

pub const KIND: &str = "multisig-proposal";

sol! {
	struct SafeTx {
		address to;
		uint256 value;
		bytes data;
		uint8 operation;
		uint256 safeTxGas;
		uint256 baseGas;
		uint256 gasPrice;
		address gasToken;
		address refundReceiver;
		uint256 nonce;
	}
}

/// Submitter that queues every transaction as a Safe proposal.
pub struct MultisigProposalSubmitter {
	runtime: Arc<ChainRuntime>,
	proposals: Arc<dyn ProposalService>,
	safe: Address,
	threshold: u32,
	mode: SubmitMode,
}

impl MultisigProposalSubmitter {
	pub fn new(
		runtime: Arc<ChainRuntime>,
		proposals: Arc<dyn ProposalService>,
		safe: Address,
		threshold: u32,
		mode: SubmitMode,
	) -> Self {
		Self {
			runtime,
			proposals,
			safe,
			threshold,
			mode,
		}
	}

	fn safe_tx(&self, to: Address, staged: &StagedTransaction, nonce: u64) -> SafeTx {
		SafeTx {
			to,
			value: staged.transaction.value,
			data: staged.transaction.data.clone(),
			operation: 0,
			safeTxGas: U256::ZERO,
			baseGas: U256::ZERO,
			gasPrice: U256::ZERO,
			gasToken: Address::ZERO,
			refundReceiver: Address::ZERO,
			nonce: U256::from(nonce),
		}
	}

	fn safe_tx_hash(&self, safe_tx: &SafeTx) -> B256 {
		let domain = eip712_domain! {
			chain_id: self.runtime.metadata.chain_id,
			verifying_contract: self.safe,
		};
		safe_tx.eip712_signing_hash(&domain)
	}

	fn receipt(&self, staged: &StagedTransaction, outcome: ReceiptOutcome) -> Receipt {
		Receipt {
			transaction_index: staged.source_index,
			chain: self.runtime.name.clone(),
			submitter: KIND.to_string(),
			outcome,
		}
	}

	async fn propose(
		&self,
		staged: &StagedTransaction,
		safe_tx: &SafeTx,
		hash: B256,
		nonce: u64,
		sender: Address,
	) -> Result<(), SubmitterError> {
		let signature = self.runtime.account.sign_hash(&hash).await?;

		let proposal = SafeProposal {
			safe: self.safe.to_checksum(None),
			to: safe_tx.to.to_checksum(None),
			value: safe_tx.value.to_string(),
			data: hex::encode_prefixed(&safe_tx.data),
			operation: safe_tx.operation,
			safe_tx_gas: "0".into(),
			base_gas: "0".into(),
			gas_price: "0".into(),
			gas_token: Address::ZERO.to_checksum(None),
			refund_receiver: Address::ZERO.to_checksum(None),
			nonce,
			contract_transaction_hash: hash.to_string(),
			sender: sender.to_checksum(None),
			signature: hex::encode_prefixed(&signature),
			origin: "submit".into(),
		};

		let proposals = self.proposals.as_ref();
		let proposal = &proposal;
		self.runtime
			.policy
			.retry
			.run(move || proposals.propose(proposal))
			.await
			.map_err(|failure| retry_error(staged.source_index, failure, None))
	}
}

#[async_trait]
impl SubmitterInterface for MultisigProposalSubmitter {
	fn kind(&self) -> &'static str {
		KIND
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MultisigProposalSchema)
	}

	async fn submit(
		&self,
		transactions: Vec<StagedTransaction>,
	) -> Result<Vec<Receipt>, SubmitterError> {
		let mut targets = Vec::with_capacity(transactions.len());
		for staged in &transactions {
			check_chain(&self.runtime, staged)?;
			targets.push(evm_address(staged.source_index, "to", &staged.transaction.to)?);
		}

		let Some(first) = transactions.first() else {
			return Ok(Vec::new());
		};

		let proposals = self.proposals.as_ref();
		let safe = self.safe;
		let base_nonce = self
			.runtime
			.policy
			.retry
			.run(move || proposals.next_nonce(safe))
			.await
			.map_err(|failure| SubmitterError::PartialBatchFailure {
				failed_index: first.source_index,
				cause: Box::new(retry_error(first.source_index, failure, None)),
				succeeded: Vec::new(),
			})?;
		let sender = self.runtime.account.get_address().await?;

		let mut receipts = Vec::with_capacity(transactions.len());
		for (offset, (staged, to)) in transactions.iter().zip(targets).enumerate() {
			let nonce = base_nonce + offset as u64;
			let safe_tx = self.safe_tx(to, staged, nonce);
			let hash = self.safe_tx_hash(&safe_tx);

			if self.mode.is_dry_run() {
				receipts.push(self.receipt(
					staged,
					ReceiptOutcome::Simulated {
						gas_estimate: None,
						reference: Some(hash.to_string()),
					},
				));
				continue;
			}

			if let Err(cause) = self.propose(staged, &safe_tx, hash, nonce, sender).await {
				error!(
					chain = %self.runtime.name,
					index = staged.source_index,
					proposed = receipts.len(),
					error = %cause,
					"Multisig proposal stopped"
				);
				return Err(SubmitterError::PartialBatchFailure {
					failed_index: staged.source_index,
					cause: Box::new(cause),
					succeeded: receipts,
				});
			}

			info!(
				chain = %self.runtime.name,
				index = staged.source_index,
				safe_tx_hash = %hash,
				nonce,
				"Proposed transaction"
			);
			receipts.push(self.receipt(
				staged,
				ReceiptOutcome::Proposed {
					proposal_id: hash.to_string(),
					safe: self.safe.to_checksum(None),
					nonce,
					threshold: self.threshold,
				},
			));
		}

		Ok(receipts)
	}
}

/// Configuration schema for the multisig proposal submitter.
pub struct MultisigProposalSchema;

impl ConfigSchema for MultisigProposalSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("safe", FieldType::Address),
				Field::new(
					"threshold",
					FieldType::Integer {
						min: Some(1),
						max: Some(u32::MAX as i64),
					},
				),
				Field::new("service_url", FieldType::String),
			],
		)
		.strict()
		.validate(config)
	}
}

/// Factory function to create a multisig proposal submitter.
///
/// Configuration parameters:
/// - `safe`: Safe address (default: the chain's `safe`)
/// - `threshold`: signatures required (default: the chain's security module)
/// - `service_url`: Safe transaction service (default: the chain's service)
pub fn create_submitter(
	config: &toml::Value,
	runtime: Arc<ChainRuntime>,
	mode: SubmitMode,
) -> Result<Box<dyn SubmitterInterface>, SubmitterError> {
	MultisigProposalSchema
		.validate(config)
		.map_err(|e| SubmitterError::InvalidConfig(e.to_string()))?;

	let safe = config
		.get("safe")
		.and_then(|v| v.as_str())
		.or(runtime.metadata.safe.as_deref())
		.ok_or_else(|| {
			SubmitterError::InvalidConfig(format!(
				"safe is required: chain '{}' has no default Safe",
				runtime.name
			))
		})?;
	let safe = Address::from_str(safe)
		.map_err(|e| SubmitterError::InvalidConfig(format!("Invalid safe address: {}", e)))?;

	let threshold = match config.get("threshold").and_then(|v| v.as_integer()) {
		Some(threshold) => threshold as u32,
		None => runtime
			.multisig
			.as_ref()
			.map(|multisig| multisig.threshold)
			.ok_or_else(|| {
				SubmitterError::InvalidConfig(format!(
					"threshold is required: chain '{}' has no security module",
					runtime.name
				))
			})?,
	};
	if threshold == 0 {
		return Err(SubmitterError::InvalidConfig(
			"threshold must be at least 1".into(),
		));
	}
	if let Some(multisig) = &runtime.multisig {
		if threshold as usize > multisig.validators.len() {
			return Err(SubmitterError::InvalidConfig(format!(
				"threshold {} exceeds the {} validators of chain '{}'",
				threshold,
				multisig.validators.len(),
				runtime.name
			)));
		}
	}

	let proposals: Arc<dyn ProposalService> =
		match config.get("service_url").and_then(|v| v.as_str()) {
			Some(url) => Arc::new(
				SafeTransactionService::new(url)
					.map_err(|e| SubmitterError::InvalidConfig(e.to_string()))?,
			),
			None => runtime.proposals.clone().ok_or_else(|| {
				SubmitterError::InvalidConfig(format!(
					"service_url is required: chain '{}' has no Safe transaction service",
					runtime.name
				))
			})?,
		};

	Ok(Box::new(MultisigProposalSubmitter::new(
		runtime, proposals, safe, threshold, mode,
	)))
}

/// Registry for the multisig proposal submitter.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = KIND;
	type Factory = SubmitterFactory;

	fn factory() -> Self::Factory {
		create_submitter
	}
}

impl SubmitterRegistry for Registry {
	const PROTOCOLS: &'static [ProtocolType] = &[ProtocolType::Ethereum];
}
