//! Batch executor submitter.
//!
//! Encodes the whole batch into a single Multicall3 `aggregate3Value` call
//! with `allowFailure = false` on every entry, so the batch lands or reverts
//! as one. Every input gets a receipt pointing at the shared transaction.

use crate::dispatch::{check_chain, evm_address, send_and_confirm, simulate};
use crate::{
	ChainRuntime, SubmitMode, SubmitterError, SubmitterFactory, SubmitterInterface,
	SubmitterRegistry,
};
use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use submit_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, ProtocolType, Receipt, ReceiptOutcome,
	Schema, StagedTransaction, TransactionValue, ValidationError,
};
use tracing::{error, info};

pub const KIND: &str = "batch-executor";

/// Multicall3, deployed at the same address on most EVM chains.
pub const DEFAULT_MULTICALL: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

sol! {
	struct Call3Value {
		address target;
		bool allowFailure;
		uint256 value;
		bytes callData;
	}

	struct Call3Result {
		bool success;
		bytes returnData;
	}

	function aggregate3Value(Call3Value[] calls) external payable returns (Call3Result[] returnData);
}

/// Submitter that dispatches the batch as one multicall.
pub struct BatchExecutorSubmitter {
	runtime: Arc<ChainRuntime>,
	multicall: Address,
	mode: SubmitMode,
}

impl BatchExecutorSubmitter {
	pub fn new(runtime: Arc<ChainRuntime>, multicall: Address, mode: SubmitMode) -> Self {
		Self {
			runtime,
			multicall,
			mode,
		}
	}

	/// Builds the multicall transaction for a validated batch.
	fn encode(&self, transactions: &[StagedTransaction]) -> Result<TransactionValue, SubmitterError> {
		let mut calls = Vec::with_capacity(transactions.len());
		let mut total = U256::ZERO;

		for staged in transactions {
			let tx = &staged.transaction;
			total = total
				.checked_add(tx.value)
				.ok_or_else(|| SubmitterError::InvalidTransaction {
					index: staged.source_index,
					reason: "total batch value overflows".into(),
				})?;
			calls.push(Call3Value {
				target: evm_address(staged.source_index, "to", &tx.to)?,
				allowFailure: false,
				value: tx.value,
				callData: tx.data.clone(),
			});
		}

		let data = aggregate3ValueCall { calls }.abi_encode();
		Ok(TransactionValue::new(
			self.runtime.name.clone(),
			self.multicall.to_checksum(None),
			data,
		)
		.with_value(total))
	}

	fn receipt(&self, staged: &StagedTransaction, outcome: ReceiptOutcome) -> Receipt {
		Receipt {
			transaction_index: staged.source_index,
			chain: self.runtime.name.clone(),
			submitter: KIND.to_string(),
			outcome,
		}
	}
}

#[async_trait]
impl SubmitterInterface for BatchExecutorSubmitter {
	fn kind(&self) -> &'static str {
		KIND
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(BatchExecutorSchema)
	}

	async fn submit(
		&self,
		transactions: Vec<StagedTransaction>,
	) -> Result<Vec<Receipt>, SubmitterError> {
		for staged in &transactions {
			check_chain(&self.runtime, staged)?;
		}
		let Some(first) = transactions.first() else {
			return Ok(Vec::new());
		};

		let batch = self.encode(&transactions)?;
		let batch_size = transactions.len();

		if self.mode.is_dry_run() {
			let gas = simulate(&self.runtime, first.source_index, &batch).await?;
			return Ok(transactions
				.iter()
				.map(|staged| {
					self.receipt(
						staged,
						ReceiptOutcome::Simulated {
							gas_estimate: Some(gas),
							reference: None,
						},
					)
				})
				.collect());
		}

		let confirmed = send_and_confirm(&self.runtime, first.source_index, &batch)
			.await
			.map_err(|cause| {
				error!(chain = %self.runtime.name, batch_size, error = %cause, "Batch dispatch failed");
				SubmitterError::BatchDispatchFailure {
					batch_size,
					pending: cause.pending_hash().cloned(),
					cause: Box::new(cause),
				}
			})?;

		info!(
			chain = %self.runtime.name,
			tx_hash = %confirmed.hash,
			batch_size,
			"Batch executed"
		);

		Ok(transactions
			.iter()
			.enumerate()
			.map(|(position, staged)| {
				self.receipt(
					staged,
					ReceiptOutcome::Batched {
						hash: confirmed.hash.clone(),
						block_number: confirmed.block_number,
						position,
						batch_size,
					},
				)
			})
			.collect())
	}
}

/// Configuration schema for the batch executor submitter.
pub struct BatchExecutorSchema;

impl ConfigSchema for BatchExecutorSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("multicall", FieldType::Address)])
			.strict()
			.validate(config)
	}
}

/// Factory function to create a batch executor submitter.
///
/// Configuration parameters:
/// - `multicall`: Multicall3 address (default: the canonical deployment)
pub fn create_submitter(
	config: &toml::Value,
	runtime: Arc<ChainRuntime>,
	mode: SubmitMode,
) -> Result<Box<dyn SubmitterInterface>, SubmitterError> {
	BatchExecutorSchema
		.validate(config)
		.map_err(|e| SubmitterError::InvalidConfig(e.to_string()))?;

	let multicall = config
		.get("multicall")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_MULTICALL);
	let multicall = Address::from_str(multicall)
		.map_err(|e| SubmitterError::InvalidConfig(format!("Invalid multicall address: {}", e)))?;

	Ok(Box::new(BatchExecutorSubmitter::new(runtime, multicall, mode)))
}

/// Registry for the batch executor submitter.
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

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{runtime, FakeChainProvider};
	use crate::ProviderError;
	use alloy_primitives::Bytes;

	const TARGET: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

	fn batch(count: usize) -> Vec<StagedTransaction> {
		StagedTransaction::from_batch(
			(0..count)
				.map(|i| {
					TransactionValue::new("test1", TARGET, Bytes::from(vec![i as u8]))
						.with_value(U256::from(10))
				})
				.collect(),
		)
	}

	fn submitter(provider: &Arc<FakeChainProvider>, mode: SubmitMode) -> Box<dyn SubmitterInterface> {
		let config = toml::Value::Table(toml::Table::new());
		create_submitter(&config, Arc::new(runtime("test1", provider.clone())), mode).unwrap()
	}

	#[tokio::test]
	async fn test_batch_is_sent_once_with_shared_hash() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let receipts = submitter(&provider, SubmitMode::Live)
			.submit(batch(3))
			.await
			.unwrap();

		let sent = provider.broadcasts();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].to, DEFAULT_MULTICALL);
		assert_eq!(sent[0].value, U256::from(30));

		let decoded = aggregate3ValueCall::abi_decode(&sent[0].data, true).unwrap();
		assert_eq!(decoded.calls.len(), 3);
		assert!(decoded.calls.iter().all(|call| !call.allowFailure));
		assert_eq!(decoded.calls[2].callData, Bytes::from(vec![2]));

		assert_eq!(receipts.len(), 3);
		let hashes: Vec<_> = receipts.iter().map(|r| r.outcome.hash().cloned()).collect();
		assert!(hashes.iter().all(|h| h.is_some() && *h == hashes[0]));
		assert!(matches!(
			receipts[1].outcome,
			ReceiptOutcome::Batched {
				position: 1,
				batch_size: 3,
				..
			}
		));
	}

	#[tokio::test]
	async fn test_failed_dispatch_yields_no_receipts() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		provider.script_sends(vec![Err(ProviderError::Rejected("out of gas".into()))]);

		let err = submitter(&provider, SubmitMode::Live)
			.submit(batch(2))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			SubmitterError::BatchDispatchFailure {
				batch_size: 2,
				pending: None,
				..
			}
		));
		assert!(err.confirmed_receipts().is_empty());
	}

	#[tokio::test]
	async fn test_unconfirmed_batch_keeps_its_hash() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		provider.script_confirmations(vec![
			Err(ProviderError::Timeout("slow".into())),
			Err(ProviderError::Timeout("slow".into())),
			Err(ProviderError::Timeout("slow".into())),
		]);

		let err = submitter(&provider, SubmitMode::Live)
			.submit(batch(2))
			.await
			.unwrap_err();
		let SubmitterError::BatchDispatchFailure {
			pending: Some(ref hash),
			ref cause,
			..
		} = err
		else {
			panic!("expected the in-flight batch hash, got {err}");
		};
		assert_eq!(cause.pending_hash(), Some(hash));
		assert!(err.confirmed_receipts().is_empty());
		assert_eq!(provider.broadcasts().len(), 1);
	}

	#[tokio::test]
	async fn test_one_bad_entry_aborts_whole_batch() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let mut transactions = batch(3);
		transactions[1].transaction.to = "0xzz".into();

		let err = submitter(&provider, SubmitMode::Live)
			.submit(transactions)
			.await
			.unwrap_err();
		assert!(matches!(err, SubmitterError::InvalidTransaction { index: 1, .. }));
		assert_eq!(provider.send_attempts(), 0);
	}

	#[tokio::test]
	async fn test_dry_run_simulates_the_multicall() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let receipts = submitter(&provider, SubmitMode::DryRun)
			.submit(batch(2))
			.await
			.unwrap();

		assert_eq!(receipts.len(), 2);
		assert!(receipts.iter().all(|r| r.outcome.is_simulated()));
		assert_eq!(provider.simulations().len(), 1);
		assert_eq!(provider.send_attempts(), 0);
	}

	#[tokio::test]
	async fn test_empty_batch_dispatches_nothing() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let receipts = submitter(&provider, SubmitMode::Live)
			.submit(Vec::new())
			.await
			.unwrap();
		assert!(receipts.is_empty());
		assert_eq!(provider.send_attempts(), 0);
	}
}
