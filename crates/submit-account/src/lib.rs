//! Account management for the transaction submission system.
//!
//! Submitters never touch raw keys directly. They sign through an
//! [`AccountService`], which wraps one [`AccountInterface`] implementation:
//! a `local` key from configuration, or a `managed` key resolved lazily from
//! a [`KeyBackend`] through the [`ManagedKey`] lifecycle.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use std::sync::Arc;
use submit_types::{ConfigSchema, ImplementationRegistry, SecretString};
use thiserror::Error;

pub mod key;

pub use key::{
	KeyAddress, KeyBackend, KeyIdentity, KeyLabels, KeyRole, ManagedKey, PersistedKey, RemoteKey,
};

/// Re-export implementations
pub mod implementations {
	pub mod local;
	pub mod managed;

	/// Key storage backends.
	pub mod backends {
		pub mod file;
		pub mod memory;
	}
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when an implementation's configuration is rejected.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	/// A key was read before it was fetched from its backend.
	#[error("Key {0} has not been fetched")]
	KeyNotFetched(String),
	/// The backend holds no key under the identifier.
	#[error("Key {0} not found")]
	KeyNotFound(String),
	/// Error reported by the key backend.
	#[error("Key backend error: {0}")]
	Backend(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the address associated with this account.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte digest, returning the 65-byte `r || s || v` signature.
	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError>;

	/// Returns the private key with `0x` prefix.
	///
	/// Used by chain providers to build their transaction signer.
	async fn private_key(&self) -> Result<SecretString, AccountError>;
}

/// Deployment context an account is created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
	/// Environment name, part of every managed key identifier.
	pub environment: String,
	/// Chain the account signs for, when the account is chain-specific.
	pub chain: Option<String>,
}

impl AccountContext {
	pub fn new(environment: impl Into<String>) -> Self {
		Self {
			environment: environment.into(),
			chain: None,
		}
	}

	pub fn for_chain(mut self, chain: impl Into<String>) -> Self {
		self.chain = Some(chain.into());
		self
	}
}

/// Type alias for account factory functions.
pub type AccountFactory =
	fn(&toml::Value, &AccountContext) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Type alias for key backend factory functions.
pub type KeyBackendFactory = fn(&toml::Value) -> Result<Box<dyn KeyBackend>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::{local, managed};

	vec![
		(local::Registry::NAME, local::Registry::factory()),
		(managed::Registry::NAME, managed::Registry::factory()),
	]
}

/// Get all registered key backends.
pub fn get_all_backend_implementations() -> Vec<(&'static str, KeyBackendFactory)> {
	use implementations::backends::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Builds the key backend named by the `backend` entry of `config`.
pub fn create_key_backend(config: &toml::Value) -> Result<Arc<dyn KeyBackend>, AccountError> {
	let name = config
		.get("backend")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidConfig("backend is required".into()))?;

	let factory = get_all_backend_implementations()
		.into_iter()
		.find(|(backend, _)| *backend == name)
		.map(|(_, factory)| factory)
		.ok_or_else(|| AccountError::InvalidConfig(format!("Unknown key backend '{}'", name)))?;

	Ok(Arc::from(factory(config)?))
}

/// Service that manages account operations.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs a digest with the managed account.
	pub async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError> {
		self.implementation.sign_hash(hash).await
	}

	/// Returns the private key as a SecretString.
	pub async fn get_private_key(&self) -> Result<SecretString, AccountError> {
		self.implementation.private_key().await
	}
}
