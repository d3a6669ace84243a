//! Dynamic factory registry for submission implementations.
//!
//! Collects every storage, account, chain provider, submitter and transformer
//! implementation once, then selects the ones a configuration names so an
//! unknown implementation is reported before anything is built.

use std::collections::HashMap;
use std::sync::OnceLock;
use submit_account::AccountFactory;
use submit_config::Config;
use submit_core::{Orchestrator, SubmissionFactories};
use submit_delivery::{ChainProviderFactory, SubmitterRegistration};
use submit_storage::StorageFactory;
use submit_transform::TransformerRegistration;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub account: HashMap<String, AccountFactory>,
	pub provider: HashMap<String, ChainProviderFactory>,
	pub submitter: HashMap<String, SubmitterRegistration>,
	pub transformer: HashMap<String, TransformerRegistration>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			account: HashMap::new(),
			provider: HashMap::new(),
			submitter: HashMap::new(),
			transformer: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_account(&mut self, name: impl Into<String>, factory: AccountFactory) {
		self.account.insert(name.into(), factory);
	}

	/// Register a chain provider under the protocol name it serves
	pub fn register_provider(&mut self, protocol: impl Into<String>, factory: ChainProviderFactory) {
		self.provider.insert(protocol.into(), factory);
	}

	pub fn register_submitter(&mut self, registration: SubmitterRegistration) {
		self.submitter
			.insert(registration.kind.to_string(), registration);
	}

	pub fn register_transformer(&mut self, registration: TransformerRegistration) {
		self.transformer
			.insert(registration.kind.to_string(), registration);
	}
}

// Global registry instance
static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in submit_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in submit_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.register_account(name, factory);
		}

		for (protocol, factory) in submit_delivery::get_all_chain_providers() {
			tracing::debug!("Registering chain provider: {}", protocol);
			registry.register_provider(protocol, factory);
		}

		for registration in submit_delivery::get_all_implementations() {
			tracing::debug!(
				protocols = ?registration.protocols,
				"Registering submitter: {}",
				registration.kind
			);
			registry.register_submitter(registration);
		}

		for registration in submit_transform::get_all_implementations() {
			tracing::debug!(
				protocols = ?registration.protocols,
				"Registering transformer: {}",
				registration.kind
			);
			registry.register_transformer(registration);
		}

		registry
	})
}

/// Get the global factory registry
pub fn get_registry() -> &'static FactoryRegistry {
	initialize_registry()
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Selects the factories a configuration needs.
///
/// Submitters and transformers are chosen per run by the strategy, so all of
/// them stay available.
pub fn factories_for_config(
	config: &Config,
) -> Result<SubmissionFactories, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let account_factories =
		build_factories!(registry, config.account.implementations, account, "account");

	Ok(SubmissionFactories {
		storage_factories,
		account_factories,
		provider_factories: registry.provider.clone(),
		submitter_factories: registry.submitter.clone(),
		transformer_factories: registry.transformer.clone(),
	})
}

/// Build the orchestrator using registry and config
pub fn build_orchestrator_from_config(
	config: Config,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
	let factories = factories_for_config(&config)?;
	Ok(Orchestrator::from_config(config, factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use submit_config::builders::ConfigBuilder;

	#[test]
	fn test_registry_knows_every_kind() {
		let registry = get_registry();
		for kind in ["direct", "multisig-proposal", "batch-executor"] {
			assert!(registry.submitter.contains_key(kind), "missing {kind}");
		}
		for kind in ["interchain-account", "timelock"] {
			assert!(registry.transformer.contains_key(kind), "missing {kind}");
		}
		assert!(registry.provider.contains_key("ethereum"));
		assert!(registry.storage.contains_key("file"));
		assert!(registry.account.contains_key("managed"));
	}

	#[test]
	fn test_unknown_storage_is_reported_with_alternatives() {
		let config = ConfigBuilder::new().storage_primary("redis").build();
		let err = factories_for_config(&config).err().map(|e| e.to_string());
		assert_eq!(
			err.as_deref(),
			Some("Unknown storage implementation 'redis'. Available: [file, memory]")
		);
	}

	#[test]
	fn test_builds_orchestrator_for_minimal_config() {
		assert!(build_orchestrator_from_config(ConfigBuilder::new().build()).is_ok());
	}
}
