//! Direct submitter.
//!
//! Signs and broadcasts each transaction independently, in order, with the
//! chain account. Every transaction is validated before the first broadcast;
//! after that a failure at transaction k leaves 0..k confirmed and k..n
//! untouched.

use crate::dispatch::{check_chain, send_and_confirm, simulate};
use crate::{
	ChainRuntime, SubmitMode, SubmitterError, SubmitterFactory, SubmitterInterface,
	SubmitterRegistry,
};
use async_trait::async_trait;
use std::sync::Arc;
use submit_types::{
	ConfigSchema, ImplementationRegistry, ProtocolType, Receipt, ReceiptOutcome, Schema,
	StagedTransaction, ValidationError,
};
use tracing::{error, info};

pub const KIND: &str = "direct";

/// Submitter that broadcasts every transaction itself.
pub struct DirectSubmitter {
	runtime: Arc<ChainRuntime>,
	mode: SubmitMode,
}

impl DirectSubmitter {
	pub fn new(runtime: Arc<ChainRuntime>, mode: SubmitMode) -> Self {
		Self { runtime, mode }
	}

	fn validate(&self, transactions: &[StagedTransaction]) -> Result<(), SubmitterError> {
		for staged in transactions {
			check_chain(&self.runtime, staged)?;
			self.runtime
				.provider
				.validate_transaction(&staged.transaction)
				.map_err(|e| SubmitterError::InvalidTransaction {
					index: staged.source_index,
					reason: e.to_string(),
				})?;
		}
		Ok(())
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
impl SubmitterInterface for DirectSubmitter {
	fn kind(&self) -> &'static str {
		KIND
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(DirectSubmitterSchema)
	}

	async fn submit(
		&self,
		transactions: Vec<StagedTransaction>,
	) -> Result<Vec<Receipt>, SubmitterError> {
		self.validate(&transactions)?;

		let mut receipts = Vec::with_capacity(transactions.len());

		if self.mode.is_dry_run() {
			for staged in &transactions {
				let gas = simulate(&self.runtime, staged.source_index, &staged.transaction).await?;
				receipts.push(self.receipt(
					staged,
					ReceiptOutcome::Simulated {
						gas_estimate: Some(gas),
						reference: None,
					},
				));
			}
			return Ok(receipts);
		}

		for staged in &transactions {
			match send_and_confirm(&self.runtime, staged.source_index, &staged.transaction).await {
				Ok(confirmed) => receipts.push(self.receipt(
					staged,
					ReceiptOutcome::Executed {
						hash: confirmed.hash,
						block_number: confirmed.block_number,
					},
				)),
				Err(cause) => {
					error!(
						chain = %self.runtime.name,
						index = staged.source_index,
						confirmed = receipts.len(),
						error = %cause,
						"Direct submission stopped"
					);
					return Err(SubmitterError::PartialBatchFailure {
						failed_index: staged.source_index,
						cause: Box::new(cause),
						succeeded: receipts,
					});
				},
			}
		}

		info!(chain = %self.runtime.name, count = receipts.len(), "Direct submission complete");
		Ok(receipts)
	}
}

/// The direct submitter takes no parameters.
pub struct DirectSubmitterSchema;

impl ConfigSchema for DirectSubmitterSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).strict().validate(config)
	}
}

/// Factory function to create a direct submitter.
pub fn create_submitter(
	config: &toml::Value,
	runtime: Arc<ChainRuntime>,
	mode: SubmitMode,
) -> Result<Box<dyn SubmitterInterface>, SubmitterError> {
	DirectSubmitterSchema
		.validate(config)
		.map_err(|e| SubmitterError::InvalidConfig(e.to_string()))?;

	Ok(Box::new(DirectSubmitter::new(runtime, mode)))
}

/// Registry for the direct submitter.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = KIND;
	type Factory = SubmitterFactory;

	fn factory() -> Self::Factory {
		create_submitter
	}
}

impl SubmitterRegistry for Registry {
	const PROTOCOLS: &'static [ProtocolType] = &[
		ProtocolType::Ethereum,
		ProtocolType::Sealevel,
		ProtocolType::Cosmos,
	];
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{runtime, FakeChainProvider};
	use crate::ProviderError;
	use alloy_primitives::Bytes;
	use submit_types::TransactionValue;

	const TARGET: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

	fn batch(count: usize) -> Vec<StagedTransaction> {
		StagedTransaction::from_batch(
			(0..count)
				.map(|i| TransactionValue::new("test1", TARGET, Bytes::from(vec![i as u8])))
				.collect(),
		)
	}

	fn submitter(provider: &Arc<FakeChainProvider>, mode: SubmitMode) -> DirectSubmitter {
		DirectSubmitter::new(Arc::new(runtime("test1", provider.clone())), mode)
	}

	#[tokio::test]
	async fn test_receipts_follow_input_order() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let receipts = submitter(&provider, SubmitMode::Live)
			.submit(batch(3))
			.await
			.unwrap();

		let indices: Vec<usize> = receipts.iter().map(|r| r.transaction_index).collect();
		assert_eq!(indices, vec![0, 1, 2]);
		assert!(receipts
			.iter()
			.all(|r| matches!(r.outcome, ReceiptOutcome::Executed { .. })));

		let sent: Vec<u8> = provider.broadcasts().iter().map(|tx| tx.data[0]).collect();
		assert_eq!(sent, vec![0, 1, 2]);
	}

	#[tokio::test]
	async fn test_exhausted_retries_report_partial_failure() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		provider.script_sends(vec![
			Ok(()),
			Err(ProviderError::Transient("503".into())),
			Err(ProviderError::Transient("503".into())),
			Err(ProviderError::Transient("503".into())),
		]);

		let err = submitter(&provider, SubmitMode::Live)
			.submit(batch(3))
			.await
			.unwrap_err();

		match err {
			SubmitterError::PartialBatchFailure {
				failed_index,
				cause,
				succeeded,
			} => {
				assert_eq!(failed_index, 1);
				assert_eq!(succeeded.len(), 1);
				assert_eq!(succeeded[0].transaction_index, 0);
				assert!(matches!(
					*cause,
					SubmitterError::TransientDispatchFailure { attempts: 3, .. }
				));
			},
			other => panic!("unexpected error: {other}"),
		}
		// The third transaction was never attempted.
		assert_eq!(provider.send_attempts(), 4);
		assert_eq!(provider.broadcasts().len(), 1);
	}

	#[tokio::test]
	async fn test_confirmation_timeout_waits_again_without_resending() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		provider.script_confirmations(vec![Err(ProviderError::Timeout("slow".into()))]);

		let receipts = submitter(&provider, SubmitMode::Live)
			.submit(batch(1))
			.await
			.unwrap();
		assert_eq!(receipts.len(), 1);
		assert_eq!(provider.send_attempts(), 1);
	}

	#[tokio::test]
	async fn test_lost_broadcast_reply_lands_once() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		provider.script_lost_reply(ProviderError::Transient("connection reset".into()));

		let receipts = submitter(&provider, SubmitMode::Live)
			.submit(batch(2))
			.await
			.unwrap();
		assert_eq!(receipts.len(), 2);
		// The retried broadcast resends the same signed transaction.
		assert_eq!(provider.send_attempts(), 3);
		let sent: Vec<u8> = provider.broadcasts().iter().map(|tx| tx.data[0]).collect();
		assert_eq!(sent, vec![0, 1]);
	}

	#[tokio::test]
	async fn test_unconfirmed_broadcast_reports_pending_hash() {
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
		let SubmitterError::PartialBatchFailure { ref cause, .. } = err else {
			panic!("unexpected error: {err}");
		};
		let SubmitterError::TransientDispatchFailure {
			index: 0,
			pending: Some(ref hash),
			..
		} = **cause
		else {
			panic!("expected the in-flight hash, got {cause}");
		};
		assert_eq!(err.pending_hash(), Some(hash));
		assert!(err.to_string().contains("may still land"));
		assert_eq!(provider.broadcasts().len(), 1);
		assert_eq!(provider.send_attempts(), 1);
	}

	#[tokio::test]
	async fn test_revert_is_not_retried() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		provider.script_confirmations(vec![Ok(false)]);

		let err = submitter(&provider, SubmitMode::Live)
			.submit(batch(2))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			SubmitterError::PartialBatchFailure { failed_index: 0, ref cause, .. }
				if matches!(**cause, SubmitterError::Reverted { .. })
		));
		assert_eq!(provider.send_attempts(), 1);
	}

	#[tokio::test]
	async fn test_invalid_transaction_blocks_every_broadcast() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let mut transactions = batch(3);
		transactions[2].transaction.to = "not-an-address".into();

		let err = submitter(&provider, SubmitMode::Live)
			.submit(transactions)
			.await
			.unwrap_err();
		assert!(matches!(err, SubmitterError::InvalidTransaction { index: 2, .. }));
		assert_eq!(provider.send_attempts(), 0);
	}

	#[tokio::test]
	async fn test_wrong_chain_is_rejected() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let mut transactions = batch(1);
		transactions[0].transaction.chain = "test2".into();

		let err = submitter(&provider, SubmitMode::Live)
			.submit(transactions)
			.await
			.unwrap_err();
		assert!(matches!(err, SubmitterError::InvalidTransaction { index: 0, .. }));
	}

	#[tokio::test]
	async fn test_dry_run_simulates_without_broadcasting() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let receipts = submitter(&provider, SubmitMode::DryRun)
			.submit(batch(2))
			.await
			.unwrap();

		assert_eq!(receipts.len(), 2);
		assert!(receipts.iter().all(|r| r.outcome.is_simulated()));
		assert_eq!(provider.simulations().len(), 2);
		assert_eq!(provider.send_attempts(), 0);
	}

	#[test]
	fn test_factory_rejects_unknown_params() {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let config = toml::Value::Table("threshold = 2".parse().unwrap());
		assert!(matches!(
			create_submitter(&config, Arc::new(runtime("test1", provider)), SubmitMode::Live),
			Err(SubmitterError::InvalidConfig(_))
		));
	}
}
