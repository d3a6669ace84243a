//! Builder for submission pipelines.
//!
//! Resolves a [`SubmissionStrategy`] against the protocol family of its chain
//! into a [`Pipeline`]: the strategy's transformers in list order, followed by
//! exactly one submitter. Kinds are looked up in the registered factories,
//! never matched on directly, so new variants only need a registration.

use std::collections::HashMap;
use std::sync::Arc;
use submit_account::{AccountError, AccountFactory};
use submit_delivery::{
	ChainProviderFactory, ChainRuntime, ProviderError, SubmitMode, SubmitterError,
	SubmitterRegistration,
};
use submit_storage::{StorageError, StorageFactory};
use submit_transform::{TransformChain, TransformContext, TransformError, TransformerRegistration};
use submit_types::{ChainMetadata, ProtocolType, SubmissionStrategy};
use thiserror::Error;

mod pipeline;

pub use pipeline::{Pipeline, PipelineError, PipelineShape};

/// Errors that can occur while resolving a strategy or its chain.
///
/// All of them surface before any network call is made.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Unknown chain '{0}'")]
	UnknownChain(String),
	#[error("Strategy targets chain '{strategy}' but the runtime is bound to '{runtime}'")]
	ChainMismatch { strategy: String, runtime: String },
	#[error("No chain provider for protocol {protocol} (chain '{chain}')")]
	UnsupportedProtocol {
		chain: String,
		protocol: ProtocolType,
	},
	#[error("Submitter kind '{kind}' is not supported for protocol {protocol}")]
	UnsupportedSubmitterKind { kind: String, protocol: ProtocolType },
	#[error("Transformer kind '{kind}' is not supported for protocol {protocol}")]
	UnsupportedTransformerKind { kind: String, protocol: ProtocolType },
	#[error(transparent)]
	Submitter(#[from] SubmitterError),
	#[error(transparent)]
	Transform(#[from] TransformError),
	#[error("Account error: {0}")]
	Account(#[from] AccountError),
	#[error("Provider error: {0}")]
	Provider(#[from] ProviderError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Container for all factory functions needed to run submissions.
///
/// Storage, account and chain provider factories are keyed by the
/// implementation name used in the service configuration. Submitter and
/// transformer registrations are keyed by the `type` tag of strategy entries.
#[derive(Clone, Default)]
pub struct SubmissionFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub account_factories: HashMap<String, AccountFactory>,
	pub provider_factories: HashMap<String, ChainProviderFactory>,
	pub submitter_factories: HashMap<String, SubmitterRegistration>,
	pub transformer_factories: HashMap<String, TransformerRegistration>,
}

impl SubmissionFactories {
	/// Factories for every implementation compiled into the workspace.
	pub fn all() -> Self {
		Self {
			storage_factories: collect(submit_storage::get_all_implementations()),
			account_factories: collect(submit_account::get_all_implementations()),
			provider_factories: collect(submit_delivery::get_all_chain_providers()),
			submitter_factories: submit_delivery::get_all_implementations()
				.into_iter()
				.map(|registration| (registration.kind.to_string(), registration))
				.collect(),
			transformer_factories: submit_transform::get_all_implementations()
				.into_iter()
				.map(|registration| (registration.kind.to_string(), registration))
				.collect(),
		}
	}
}

fn collect<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}

/// Builds pipelines from strategies.
#[derive(Clone)]
pub struct SubmitterBuilder {
	submitters: HashMap<String, SubmitterRegistration>,
	transformers: HashMap<String, TransformerRegistration>,
}

impl SubmitterBuilder {
	pub fn new(factories: &SubmissionFactories) -> Self {
		Self {
			submitters: factories.submitter_factories.clone(),
			transformers: factories.transformer_factories.clone(),
		}
	}

	/// Checks that every kind named by `strategy` is registered for the
	/// protocol family of its chain.
	///
	/// Needs only the chain's metadata, so unsupported kinds are reported
	/// before any signing key is fetched or provider is built.
	pub fn check(
		&self,
		strategy: &SubmissionStrategy,
		metadata: &ChainMetadata,
	) -> Result<(), BuilderError> {
		self.resolve_kinds(strategy, metadata.protocol).map(|_| ())
	}

	/// Resolves `strategy` into a pipeline bound to `runtime`.
	///
	/// The submitter kind is checked first, then every transform in list
	/// order. In dry-run mode the submitter is built to simulate instead of
	/// broadcast.
	pub fn build(
		&self,
		strategy: &SubmissionStrategy,
		runtime: Arc<ChainRuntime>,
		dry_run: bool,
	) -> Result<Pipeline, BuilderError> {
		if strategy.chain != runtime.name {
			return Err(BuilderError::ChainMismatch {
				strategy: strategy.chain.clone(),
				runtime: runtime.name.clone(),
			});
		}
		let (submitter, transformers) = self.resolve_kinds(strategy, runtime.protocol())?;

		let context = TransformContext {
			chain: runtime.name.clone(),
			metadata: runtime.metadata.clone(),
		};
		let mut stages = Vec::with_capacity(transformers.len());
		for (spec, transformer) in strategy.transforms.iter().zip(transformers) {
			stages.push((transformer.factory)(&spec.params_value(), &context)?);
		}

		let mode = SubmitMode::from_dry_run(dry_run);
		let chain = runtime.name.clone();
		let submitter = (submitter.factory)(&strategy.submitter.params_value(), runtime, mode)?;
		let transforms = TransformChain::new(stages);

		tracing::info!(
			chain = %chain,
			submitter = submitter.kind(),
			transforms = ?transforms.kinds(),
			dry_run,
			"Built submission pipeline"
		);

		Ok(Pipeline::new(chain, transforms, submitter, mode))
	}

	fn resolve_kinds(
		&self,
		strategy: &SubmissionStrategy,
		protocol: ProtocolType,
	) -> Result<(&SubmitterRegistration, Vec<&TransformerRegistration>), BuilderError> {
		let submitter_kind = &strategy.submitter.kind;
		let submitter = self
			.submitters
			.get(submitter_kind)
			.filter(|registration| registration.supports(protocol))
			.ok_or_else(|| BuilderError::UnsupportedSubmitterKind {
				kind: submitter_kind.clone(),
				protocol,
			})?;

		let transformers = strategy
			.transforms
			.iter()
			.map(|spec| {
				self.transformers
					.get(&spec.kind)
					.filter(|registration| registration.supports(protocol))
					.ok_or_else(|| BuilderError::UnsupportedTransformerKind {
						kind: spec.kind.clone(),
						protocol,
					})
			})
			.collect::<Result<Vec<_>, _>>()?;
		Ok((submitter, transformers))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use submit_delivery::testing::{runtime, with_multisig, FakeChainProvider, FakeProposalService};
	use submit_types::KindSpec;

	const TIMELOCK: &str = "0x0000000000000000000000000000000000007113";
	const ROUTER: &str = "0x9A676e781A523b5d0C0e43731313A708CB607508";

	fn builder() -> SubmitterBuilder {
		SubmitterBuilder::new(&SubmissionFactories::all())
	}

	fn evm_runtime() -> Arc<ChainRuntime> {
		Arc::new(runtime("test1", Arc::new(FakeChainProvider::new(31337))))
	}

	#[test]
	fn test_resolves_submitter_and_transforms_in_order() {
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(
				KindSpec::new("interchain-account")
					.with_param("router", ROUTER)
					.with_param("destination_chain", "test2")
					.with_param("destination_domain", 42i64),
			)
			.with_transform(KindSpec::new("timelock").with_param("timelock", TIMELOCK));

		let pipeline = builder().build(&strategy, evm_runtime(), false).unwrap();
		assert_eq!(pipeline.submitter_kind(), "direct");
		assert_eq!(pipeline.transformer_kinds(), vec!["interchain-account", "timelock"]);
		assert!(!pipeline.is_dry_run());
	}

	#[test]
	fn test_same_strategy_builds_equivalent_pipelines() {
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("batch-executor"))
			.with_transform(KindSpec::new("timelock").with_param("timelock", TIMELOCK));
		let runtime = evm_runtime();

		let first = builder().build(&strategy, runtime.clone(), true).unwrap();
		let second = builder().build(&strategy, runtime, true).unwrap();
		assert_eq!(first.shape(), second.shape());
	}

	#[test]
	fn test_unknown_submitter_kind() {
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("carrier-pigeon"));
		let err = builder().build(&strategy, evm_runtime(), false).unwrap_err();
		assert!(matches!(
			err,
			BuilderError::UnsupportedSubmitterKind { ref kind, protocol: ProtocolType::Ethereum }
				if kind == "carrier-pigeon"
		));
	}

	#[test]
	fn test_check_resolves_kinds_from_metadata_alone() {
		let metadata = evm_runtime().metadata.clone();

		let pigeon = SubmissionStrategy::new("test1", KindSpec::new("carrier-pigeon"));
		assert!(matches!(
			builder().check(&pigeon, &metadata),
			Err(BuilderError::UnsupportedSubmitterKind { ref kind, .. }) if kind == "carrier-pigeon"
		));

		let teleport = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(KindSpec::new("teleport"));
		assert!(matches!(
			builder().check(&teleport, &metadata),
			Err(BuilderError::UnsupportedTransformerKind { ref kind, .. }) if kind == "teleport"
		));

		let mut sealevel = metadata.clone();
		sealevel.protocol = ProtocolType::Sealevel;
		let batch = SubmissionStrategy::new("test1", KindSpec::new("batch-executor"));
		assert!(builder().check(&batch, &metadata).is_ok());
		assert!(builder().check(&batch, &sealevel).is_err());
	}

	#[test]
	fn test_submitter_kind_must_match_protocol() {
		let provider = FakeChainProvider::new(1399811149).with_protocol(ProtocolType::Sealevel);
		let runtime = Arc::new(runtime("solana", Arc::new(provider)));

		let batch = SubmissionStrategy::new("solana", KindSpec::new("batch-executor"));
		assert!(matches!(
			builder().build(&batch, runtime.clone(), false),
			Err(BuilderError::UnsupportedSubmitterKind { protocol: ProtocolType::Sealevel, .. })
		));

		let direct = SubmissionStrategy::new("solana", KindSpec::new("direct"));
		assert!(builder().build(&direct, runtime, false).is_ok());
	}

	#[test]
	fn test_unknown_transformer_kind_is_reported() {
		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(KindSpec::new("timelock").with_param("timelock", TIMELOCK))
			.with_transform(KindSpec::new("teleport"));
		let err = builder().build(&strategy, evm_runtime(), false).unwrap_err();
		assert!(matches!(
			err,
			BuilderError::UnsupportedTransformerKind { ref kind, .. } if kind == "teleport"
		));
	}

	#[test]
	fn test_invalid_params_surface_as_config_errors() {
		let strategy = SubmissionStrategy::new(
			"test1",
			KindSpec::new("direct").with_param("unexpected", true),
		);
		assert!(matches!(
			builder().build(&strategy, evm_runtime(), false),
			Err(BuilderError::Submitter(SubmitterError::InvalidConfig(_)))
		));

		let strategy = SubmissionStrategy::new("test1", KindSpec::new("direct"))
			.with_transform(KindSpec::new("timelock"));
		assert!(matches!(
			builder().build(&strategy, evm_runtime(), false),
			Err(BuilderError::Transform(TransformError::InvalidConfig(_)))
		));
	}

	#[test]
	fn test_strategy_chain_must_match_runtime() {
		let strategy = SubmissionStrategy::new("test2", KindSpec::new("direct"));
		assert!(matches!(
			builder().build(&strategy, evm_runtime(), false),
			Err(BuilderError::ChainMismatch { .. })
		));
	}

	#[test]
	fn test_multisig_threshold_is_checked_against_validators() {
		let proposals = Arc::new(FakeProposalService::new(0));
		let runtime = Arc::new(with_multisig(
			runtime("test1", Arc::new(FakeChainProvider::new(31337))),
			proposals,
			2,
			2,
		));

		let ok = SubmissionStrategy::new(
			"test1",
			KindSpec::new("multisig-proposal").with_param("threshold", 2i64),
		);
		assert!(builder().build(&ok, runtime.clone(), false).is_ok());

		let unreachable = SubmissionStrategy::new(
			"test1",
			KindSpec::new("multisig-proposal").with_param("threshold", 3i64),
		);
		assert!(builder().build(&unreachable, runtime, false).is_err());
	}
}
