//! Chain runtime registry.
//!
//! Resolves a chain name from the service configuration into a
//! [`ChainRuntime`]: the signing account, a provider for the chain's protocol
//! family, the dispatch policy, and the security-module settings multisig
//! submitters need. Runtimes are built on first use and cached for the run,
//! so the signing key is fetched from its backend at most once.

use crate::builder::{BuilderError, SubmissionFactories};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use submit_account::{AccountContext, AccountFactory, AccountService};
use submit_config::Config;
use submit_delivery::{
	ChainProviderFactory, ChainRuntime, DispatchPolicy, ProposalService, RetryPolicy,
	SafeTransactionService,
};
use submit_types::ChainMetadata;
use tokio::sync::Mutex;

/// Resolves and caches chain runtimes for one run.
pub struct ChainRegistry {
	config: Config,
	account_factories: HashMap<String, AccountFactory>,
	provider_factories: HashMap<String, ChainProviderFactory>,
	runtimes: Mutex<HashMap<String, Arc<ChainRuntime>>>,
}

impl ChainRegistry {
	pub fn new(config: Config, factories: &SubmissionFactories) -> Self {
		Self {
			config,
			account_factories: factories.account_factories.clone(),
			provider_factories: factories.provider_factories.clone(),
			runtimes: Mutex::new(HashMap::new()),
		}
	}

	/// Registers a pre-built runtime, replacing any cached one for its chain.
	pub async fn insert(&self, runtime: ChainRuntime) {
		self.runtimes
			.lock()
			.await
			.insert(runtime.name.clone(), Arc::new(runtime));
	}

	/// Returns the metadata of `chain` without building its runtime.
	pub async fn metadata(&self, chain: &str) -> Result<ChainMetadata, BuilderError> {
		if let Some(runtime) = self.runtimes.lock().await.get(chain) {
			return Ok(runtime.metadata.clone());
		}
		self.config
			.chain(chain)
			.cloned()
			.ok_or_else(|| BuilderError::UnknownChain(chain.to_string()))
	}

	/// Returns the runtime for `chain`, building it on first use.
	pub async fn resolve(&self, chain: &str) -> Result<Arc<ChainRuntime>, BuilderError> {
		let mut runtimes = self.runtimes.lock().await;
		if let Some(runtime) = runtimes.get(chain) {
			return Ok(runtime.clone());
		}

		let runtime = Arc::new(self.build(chain).await?);
		runtimes.insert(chain.to_string(), runtime.clone());
		Ok(runtime)
	}

	async fn build(&self, chain: &str) -> Result<ChainRuntime, BuilderError> {
		let metadata = self
			.config
			.chain(chain)
			.cloned()
			.ok_or_else(|| BuilderError::UnknownChain(chain.to_string()))?;

		let account_name = self.config.account.primary.as_str();
		let account_config = self
			.config
			.account
			.implementations
			.get(account_name)
			.ok_or_else(|| {
				BuilderError::Config(format!("Primary account '{}' is not configured", account_name))
			})?;
		let account_factory = self.account_factories.get(account_name).ok_or_else(|| {
			BuilderError::Config(format!("Unknown account implementation '{}'", account_name))
		})?;
		let context = AccountContext::new(&self.config.service.environment).for_chain(chain);
		let account = Arc::new(AccountService::new(account_factory(account_config, &context)?));

		// Fetches managed keys from their backend
		let private_key = account.get_private_key().await?;

		let provider_factory = self
			.provider_factories
			.get(metadata.protocol.as_str())
			.ok_or_else(|| BuilderError::UnsupportedProtocol {
				chain: chain.to_string(),
				protocol: metadata.protocol,
			})?;
		let provider = Arc::from(provider_factory(&metadata, &private_key)?);

		let proposals = match &metadata.safe_service_url {
			Some(url) => {
				Some(Arc::new(SafeTransactionService::new(url)?) as Arc<dyn ProposalService>)
			},
			None => None,
		};

		let submission = &self.config.submission;
		let policy = DispatchPolicy {
			min_confirmations: submission.min_confirmations,
			confirmation_timeout: submission.confirmation_timeout(),
			retry: RetryPolicy {
				max_retries: submission.max_retries,
				initial_delay: Duration::from_millis(submission.retry_initial_delay_ms),
				max_delay: Duration::from_millis(submission.retry_max_delay_ms),
			},
		};

		let runtime = ChainRuntime {
			name: chain.to_string(),
			multisig: self.config.multisig(chain).cloned(),
			metadata,
			provider,
			account,
			proposals,
			policy,
		};

		tracing::info!(
			component = "chains",
			chain = %chain,
			protocol = %runtime.protocol(),
			signer = %runtime.provider.signer_address(),
			multisig = runtime.multisig.is_some(),
			"Loaded"
		);
		Ok(runtime)
	}
}
