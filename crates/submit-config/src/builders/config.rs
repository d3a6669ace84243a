//! Configuration builder for creating test and development configurations.
//!
//! Produces a `Config` with one local Ethereum chain, an in-memory store and a
//! fixed local signing key, so tests only spell out what they care about.

use crate::{AccountConfig, Config, ServiceConfig, StorageConfig, SubmissionConfig};
use std::collections::HashMap;
use submit_types::{ChainMetadata, MultisigConfig, ProtocolType};

/// Well-known development key (first default anvil account).
pub const DEV_PRIVATE_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	environment: String,
	chains: HashMap<String, ChainMetadata>,
	security: HashMap<String, MultisigConfig>,
	submission: SubmissionConfig,
	storage_primary: String,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a builder with a single `test1` chain and zero-delay retries.
	pub fn new() -> Self {
		let mut chains = HashMap::new();
		chains.insert(
			"test1".to_string(),
			ChainMetadata {
				protocol: ProtocolType::Ethereum,
				chain_id: 31337,
				domain_id: None,
				rpc_url: "http://localhost:8545".to_string(),
				safe: Some("0x0000000000000000000000000000000000005afe".to_string()),
				safe_service_url: None,
			},
		);

		Self {
			environment: "test".to_string(),
			chains,
			security: HashMap::new(),
			submission: SubmissionConfig {
				retry_initial_delay_ms: 0,
				retry_max_delay_ms: 0,
				confirmation_timeout_seconds: 1,
				..SubmissionConfig::default()
			},
			storage_primary: "memory".to_string(),
		}
	}

	/// Sets the environment name.
	pub fn environment(mut self, environment: impl Into<String>) -> Self {
		self.environment = environment.into();
		self
	}

	/// Adds or replaces a chain.
	pub fn chain(mut self, name: impl Into<String>, metadata: ChainMetadata) -> Self {
		self.chains.insert(name.into(), metadata);
		self
	}

	/// Adds a security-module entry for a chain.
	pub fn multisig(mut self, chain: impl Into<String>, config: MultisigConfig) -> Self {
		self.security.insert(chain.into(), config);
		self
	}

	/// Sets the number of retries after the first attempt.
	pub fn max_retries(mut self, retries: u32) -> Self {
		self.submission.max_retries = retries;
		self
	}

	/// Sets the primary storage implementation.
	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let mut account_implementations = HashMap::new();
		let mut local = toml::Table::new();
		local.insert("private_key".into(), DEV_PRIVATE_KEY.into());
		account_implementations.insert("local".to_string(), toml::Value::Table(local));

		let mut storage_implementations = HashMap::new();
		storage_implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::Table::new()),
		);

		Config {
			service: ServiceConfig {
				environment: self.environment,
			},
			chains: self.chains,
			account: AccountConfig {
				primary: "local".to_string(),
				implementations: account_implementations,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: storage_implementations,
			},
			submission: self.submission,
			security: self.security,
		}
	}
}
