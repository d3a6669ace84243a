//! The built transformer chain plus submitter, behind one `submit` call.

use std::fmt;
use submit_delivery::{SubmitMode, SubmitterError, SubmitterInterface};
use submit_transform::{TransformChain, TransformError};
use submit_types::{Receipt, TransactionHash, TransactionValue};
use thiserror::Error;

/// Errors returned by [`Pipeline::submit`].
#[derive(Debug, Error)]
pub enum PipelineError {
	#[error(transparent)]
	Transform(#[from] TransformError),
	#[error(transparent)]
	Submitter(#[from] SubmitterError),
}

impl PipelineError {
	/// Receipts that were confirmed before the failure.
	pub fn confirmed_receipts(&self) -> &[Receipt] {
		match self {
			PipelineError::Submitter(e) => e.confirmed_receipts(),
			PipelineError::Transform(_) => &[],
		}
	}

	/// Hash of a broadcast whose outcome is unknown.
	pub fn pending_hash(&self) -> Option<&TransactionHash> {
		match self {
			PipelineError::Submitter(e) => e.pending_hash(),
			PipelineError::Transform(_) => None,
		}
	}
}

/// Kinds bound into a pipeline, used to compare two builds of a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineShape {
	pub chain: String,
	pub submitter: &'static str,
	pub transforms: Vec<&'static str>,
	pub mode: SubmitMode,
}

/// A transformer chain followed by one submitter, bound to one chain.
pub struct Pipeline {
	chain: String,
	transforms: TransformChain,
	submitter: Box<dyn SubmitterInterface>,
	mode: SubmitMode,
}

impl fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Pipeline")
			.field("chain", &self.chain)
			.field("submitter", &self.submitter_kind())
			.field("transforms", &self.transformer_kinds())
			.field("mode", &self.mode)
			.finish()
	}
}

impl Pipeline {
	pub(crate) fn new(
		chain: String,
		transforms: TransformChain,
		submitter: Box<dyn SubmitterInterface>,
		mode: SubmitMode,
	) -> Self {
		Self {
			chain,
			transforms,
			submitter,
			mode,
		}
	}

	pub fn chain(&self) -> &str {
		&self.chain
	}

	pub fn submitter_kind(&self) -> &'static str {
		self.submitter.kind()
	}

	pub fn transformer_kinds(&self) -> Vec<&'static str> {
		self.transforms.kinds()
	}

	pub fn is_dry_run(&self) -> bool {
		self.mode.is_dry_run()
	}

	pub fn shape(&self) -> PipelineShape {
		PipelineShape {
			chain: self.chain.clone(),
			submitter: self.submitter_kind(),
			transforms: self.transformer_kinds(),
			mode: self.mode,
		}
	}

	/// Transforms the whole batch, then hands it to the submitter in one call.
	///
	/// Receipts come back in input order and carry the index of the input
	/// transaction they derive from. A transform failure happens before the
	/// submitter sees anything.
	pub async fn submit(
		&self,
		transactions: Vec<TransactionValue>,
	) -> Result<Vec<Receipt>, PipelineError> {
		let staged = self.transforms.apply(transactions)?;
		Ok(self.submitter.submit(staged).await?)
	}
}

#[cfg(test)]
mod tests {
	use crate::builder::{SubmissionFactories, SubmitterBuilder};
	use alloy_primitives::{Bytes, U256};
	use std::sync::Arc;
	use std::fmt;
use submit_delivery::testing::{runtime, FakeChainProvider};
use submit_delivery::{ChainRuntime, ProviderError, SubmitterError};
	use submit_transform::{get_all_implementations, TransformContext, TransformError};
	use submit_types::{KindSpec, ReceiptOutcome, SubmissionStrategy, TransactionValue};

	const TARGET: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
	const TIMELOCK: &str = "0x0000000000000000000000000000000000007113";
	const ROUTER: &str = "0x9A676e781A523b5d0C0e43731313A708CB607508";

	fn tx(byte: u8) -> TransactionValue {
		TransactionValue::new("test1", TARGET, Bytes::from(vec![byte])).with_value(U256::from(1))
	}

	fn remote(byte: u8) -> TransactionValue {
		TransactionValue {
			chain: "test2".to_string(),
			..tx(byte)
		}
	}

	fn setup() -> (Arc<FakeChainProvider>, Arc<ChainRuntime>) {
		let provider = Arc::new(FakeChainProvider::new(31337));
		let runtime = Arc::new(runtime("test1", provider.clone()));
		(provider, runtime)
	}

	fn build(
		strategy: &SubmissionStrategy,
		runtime: Arc<ChainRuntime>,
		dry_run: bool,
	) -> super::Pipeline {
		SubmitterBuilder::new(&SubmissionFactories::all())
			.build(strategy, runtime, dry_run)
			.unwrap()
	}

	#[tokio::test]
	async fn test_direct_returns_receipt_per_transaction_in_order() {
		let (provider, runtime) = setup();
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"));
		let pipeline = build(&strategy, runtime, false);

		let receipts = pipeline.submit(vec![tx(0), tx(1), tx(2)]).await.unwrap();
		let indices: Vec<usize> = receipts.iter().map(|r| r.transaction_index).collect();
		assert_eq!(indices, vec![0, 1, 2]);
		assert!(receipts
			.iter()
			.all(|r| matches!(r.outcome, ReceiptOutcome::Executed { .. }) && r.submitter == "direct"));
		assert_eq!(provider.broadcasts().len(), 3);
	}

	#[tokio::test]
	async fn test_chain_matches_manual_pre_transform() {
		let ica = KindSpec::new("interchain-account")
			.with_param("router", ROUTER)
			.with_param("destination_chain", "test2")
			.with_param("destination_domain", 42i64);
		let timelock = KindSpec::new("timelock").with_param("timelock", TIMELOCK);

		let (chained_provider, runtime) = setup();
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(ica.clone())
			.with_transform(timelock.clone());
		build(&strategy, runtime.clone(), false)
			.submit(vec![remote(7), remote(8)])
			.await
			.unwrap();

		// Apply the same two stages by hand and submit the result directly.
		let context = TransformContext {
			chain: runtime.name.clone(),
			metadata: runtime.metadata.clone(),
		};
		let factory = |kind: &str| {
			get_all_implementations()
				.into_iter()
				.find(|r| r.kind == kind)
				.map(|r| r.factory)
				.unwrap()
		};
		let a = factory("interchain-account")(&ica.params_value(), &context).unwrap();
		let b = factory("timelock")(&timelock.params_value(), &context).unwrap();
		let wrapped: Vec<TransactionValue> = [remote(7), remote(8)]
			.iter()
			.enumerate()
			.flat_map(|(position, input)| a.transform(position, input).unwrap())
			.collect();
		let manual: Vec<TransactionValue> = wrapped
			.iter()
			.enumerate()
			.flat_map(|(position, input)| b.transform(position, input).unwrap())
			.collect();

		let (direct_provider, direct_runtime) = setup();
		build(
			&SubmissionStrategy::new("test1", KindSpec::new("direct")),
			direct_runtime,
			false,
		)
		.submit(manual)
		.await
		.unwrap();

		assert_eq!(chained_provider.broadcasts(), direct_provider.broadcasts());
		assert_eq!(chained_provider.broadcasts().len(), 4);
	}

	#[tokio::test]
	async fn test_expanded_receipts_point_at_their_source() {
		let (_, runtime) = setup();
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(KindSpec::new("timelock").with_param("timelock", TIMELOCK));
		let receipts = build(&strategy, runtime, false)
			.submit(vec![tx(1), tx(2)])
			.await
			.unwrap();

		let indices: Vec<usize> = receipts.iter().map(|r| r.transaction_index).collect();
		assert_eq!(indices, vec![0, 0, 1, 1]);
	}

	#[tokio::test]
	async fn test_dry_run_never_broadcasts() {
		let (provider, runtime) = setup();
		for kind in ["direct", "batch-executor"] {
			let strategy = SubmissionStrategy::new("test1", KindSpec::new(kind));
			let receipts = build(&strategy, runtime.clone(), true)
				.submit(vec![tx(1), tx(2)])
				.await
				.unwrap();
			assert_eq!(receipts.len(), 2);
			assert!(receipts.iter().all(|r| r.outcome.is_simulated()));
		}
		assert_eq!(provider.send_attempts(), 0);
		assert!(!provider.simulations().is_empty());
	}

	#[tokio::test]
	async fn test_transform_failure_happens_before_dispatch() {
		let (provider, runtime) = setup();
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(KindSpec::new("timelock").with_param("timelock", TIMELOCK));
		let mut bad = tx(2);
		bad.to = "not-an-address".into();

		let err = build(&strategy, runtime, false)
			.submit(vec![tx(1), bad])
			.await
			.unwrap_err();
		assert!(matches!(err, super::PipelineError::Transform(_)));
		assert!(err.confirmed_receipts().is_empty());
		assert_eq!(provider.send_attempts(), 0);
	}

	#[tokio::test]
	async fn test_foreign_chain_transaction_is_not_rehomed() {
		let (provider, runtime) = setup();
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(KindSpec::new("timelock").with_param("timelock", TIMELOCK));

		let err = build(&strategy, runtime, false)
			.submit(vec![tx(1), remote(2)])
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			super::PipelineError::Transform(TransformError::Stage {
				kind: "timelock",
				index: 1,
				..
			})
		));
		assert_eq!(provider.send_attempts(), 0);
		assert!(provider.broadcasts().is_empty());
	}

	#[test]
	fn test_pipeline_debug_names_its_stages() {
		let (_, runtime) = setup();
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(KindSpec::new("timelock").with_param("timelock", TIMELOCK));
		let rendered = format!("{:?}", build(&strategy, runtime.clone(), true));
		assert!(rendered.contains("\"direct\""));
		assert!(rendered.contains("\"timelock\""));
		assert!(rendered.contains("DryRun"));
		assert!(format!("{:?}", runtime).contains("test1"));
	}

	#[tokio::test]
	async fn test_partial_failure_keeps_confirmed_receipts() {
		let (provider, runtime) = setup();
		provider.script_sends(vec![
			Ok(()),
			Err(ProviderError::Transient("connection reset".into())),
			Err(ProviderError::Transient("connection reset".into())),
			Err(ProviderError::Transient("connection reset".into())),
		]);

		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"));
		let err = build(&strategy, runtime, false)
			.submit(vec![tx(1), tx(2)])
			.await
			.unwrap_err();

		let super::PipelineError::Submitter(SubmitterError::PartialBatchFailure {
			failed_index,
			ref cause,
			..
		}) = err
		else {
			panic!("expected a partial batch failure, got {err:?}");
		};
		assert_eq!(failed_index, 1);
		assert!(matches!(
			**cause,
			SubmitterError::TransientDispatchFailure { index: 1, attempts: 3, .. }
		));
		assert_eq!(err.confirmed_receipts().len(), 1);
		assert_eq!(err.confirmed_receipts()[0].transaction_index, 0);
	}
}
