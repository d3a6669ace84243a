//! Configuration module for the transaction submission service.
//!
//! This module provides structures and utilities for managing service
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required values are properly set.
//!
//! Strategy and transaction batch documents are loaded through the
//! [`documents`] module; they are YAML or JSON rather than TOML because they
//! are produced per run by operators and relayers.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(any(test, feature = "testing"))]
pub mod builders;
pub mod documents;
mod loader;

pub use documents::{load_strategy, load_transactions, write_document, DocumentFormat};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use submit_types::{ChainMetadata, ChainsConfig, MultisigConfig, SecurityModuleConfig};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the submission service.
///
/// Holds everything a run needs that does not change per invocation: which
/// chains exist and how to reach them, how keys and run reports are stored,
/// the confirmation and retry policy, and the security-module settings
/// consumed by multisig submitters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Service identity.
	pub service: ServiceConfig,
	/// Known chains keyed by name.
	pub chains: ChainsConfig,
	/// Configuration for signing accounts and key backends.
	pub account: AccountConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Confirmation and retry policy applied by submitters.
	#[serde(default)]
	pub submission: SubmissionConfig,
	/// Multisig validator sets keyed by chain name.
	#[serde(default)]
	pub security: SecurityModuleConfig,
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Deployment environment, used to derive key identifiers
	/// (e.g. `"testnet4"`, `"mainnet3"`).
	pub environment: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Confirmation and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionConfig {
	/// Blocks required on top of the inclusion block before a transaction
	/// counts as confirmed.
	#[serde(default = "default_min_confirmations")]
	pub min_confirmations: u64,
	/// Upper bound for a single confirmation wait.
	#[serde(default = "default_confirmation_timeout_seconds")]
	pub confirmation_timeout_seconds: u64,
	/// Retries after the first attempt for transient dispatch failures.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Delay before the first retry.
	#[serde(default = "default_retry_initial_delay_ms")]
	pub retry_initial_delay_ms: u64,
	/// Upper bound for the exponentially growing retry delay.
	#[serde(default = "default_retry_max_delay_ms")]
	pub retry_max_delay_ms: u64,
}

impl Default for SubmissionConfig {
	fn default() -> Self {
		Self {
			min_confirmations: default_min_confirmations(),
			confirmation_timeout_seconds: default_confirmation_timeout_seconds(),
			max_retries: default_max_retries(),
			retry_initial_delay_ms: default_retry_initial_delay_ms(),
			retry_max_delay_ms: default_retry_max_delay_ms(),
		}
	}
}

impl SubmissionConfig {
	/// Confirmation timeout as a `Duration`.
	pub fn confirmation_timeout(&self) -> Duration {
		Duration::from_secs(self.confirmation_timeout_seconds)
	}
}

fn default_min_confirmations() -> u64 {
	1
}

fn default_confirmation_timeout_seconds() -> u64 {
	120
}

fn default_max_retries() -> u32 {
	2
}

fn default_retry_initial_delay_ms() -> u64 {
	500
}

fn default_retry_max_delay_ms() -> u64 {
	10_000
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Looks up the metadata of a chain by name.
	pub fn chain(&self, name: &str) -> Option<&ChainMetadata> {
		self.chains.get(name)
	}

	/// Looks up the security-module settings of a chain by name.
	pub fn multisig(&self, chain: &str) -> Option<&MultisigConfig> {
		self.security.get(chain)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the environment name is set
	/// - Checks every chain has an RPC endpoint
	/// - Verifies storage and account primaries exist in their implementations
	/// - Checks confirmation and retry bounds
	/// - Checks every security-module entry names a known chain and has a
	///   reachable threshold
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.environment.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Service environment cannot be empty".into(),
			));
		}

		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain must be configured".into(),
			));
		}
		for (name, chain) in &self.chains {
			if chain.rpc_url.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain '{}' must have an rpc_url",
					name
				)));
			}
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_primary("account", &self.account.primary, &self.account.implementations)?;

		let submission = &self.submission;
		if submission.min_confirmations > 100 {
			return Err(ConfigError::Validation(
				"min_confirmations cannot exceed 100".into(),
			));
		}
		if submission.confirmation_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"confirmation_timeout_seconds must be greater than 0".into(),
			));
		}
		if submission.max_retries > 10 {
			return Err(ConfigError::Validation(
				"max_retries cannot exceed 10".into(),
			));
		}
		if submission.retry_initial_delay_ms > submission.retry_max_delay_ms {
			return Err(ConfigError::Validation(format!(
				"retry_initial_delay_ms ({}) cannot exceed retry_max_delay_ms ({})",
				submission.retry_initial_delay_ms, submission.retry_max_delay_ms
			)));
		}

		for (chain, multisig) in &self.security {
			if !self.chains.contains_key(chain) {
				return Err(ConfigError::Validation(format!(
					"Security module for '{}' references a chain that is not configured",
					chain
				)));
			}
			multisig.validate().map_err(|e| {
				ConfigError::Validation(format!("Security module for '{}': {}", chain, e))
			})?;
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
