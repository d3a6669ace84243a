//! Key lifecycle for remotely stored signing keys.
//!
//! A [`ManagedKey`] starts out [`RemoteKey::Unfetched`] and only learns its
//! address and private material through [`ManagedKey::fetch`],
//! [`ManagedKey::create`] or [`ManagedKey::rotate`]. Reading either value
//! before that fails with [`AccountError::KeyNotFetched`].

use crate::AccountError;
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use submit_types::{with_0x_prefix, without_0x_prefix, SecretString};

/// Labels attached to a stored key for discovery in the backend.
pub type KeyLabels = HashMap<String, String>;

/// What a key is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
	Validator,
	Relayer,
	Deployer,
	Submitter,
}

impl KeyRole {
	pub fn as_str(&self) -> &'static str {
		match self {
			KeyRole::Validator => "validator",
			KeyRole::Relayer => "relayer",
			KeyRole::Deployer => "deployer",
			KeyRole::Submitter => "submitter",
		}
	}
}

impl fmt::Display for KeyRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for KeyRole {
	type Err = AccountError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"validator" => Ok(KeyRole::Validator),
			"relayer" => Ok(KeyRole::Relayer),
			"deployer" => Ok(KeyRole::Deployer),
			"submitter" => Ok(KeyRole::Submitter),
			other => Err(AccountError::InvalidKey(format!("unknown key role '{}'", other))),
		}
	}
}

/// Where a key lives: environment, role and, for validator keys, the chain
/// and index within that chain's validator set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyIdentity {
	pub environment: String,
	pub role: KeyRole,
	pub chain: Option<String>,
	pub index: Option<u32>,
}

impl KeyIdentity {
	/// Identity of a key that is shared across chains.
	pub fn new(environment: impl Into<String>, role: KeyRole) -> Self {
		Self {
			environment: environment.into(),
			role,
			chain: None,
			index: None,
		}
	}

	/// Identity of one validator key on one chain.
	pub fn validator(environment: impl Into<String>, chain: impl Into<String>, index: u32) -> Self {
		Self {
			environment: environment.into(),
			role: KeyRole::Validator,
			chain: Some(chain.into()),
			index: Some(index),
		}
	}

	/// Builds an identity from loose parts, requiring chain and index for
	/// validator keys.
	pub fn from_parts(
		environment: impl Into<String>,
		role: KeyRole,
		chain: Option<String>,
		index: Option<u32>,
	) -> Result<Self, AccountError> {
		let environment = environment.into();
		if role != KeyRole::Validator {
			return Ok(Self::new(environment, role));
		}
		match (chain, index) {
			(Some(chain), Some(index)) => Ok(Self::validator(environment, chain, index)),
			_ => Err(AccountError::InvalidKey(
				"validator keys need both a chain and an index".into(),
			)),
		}
	}

	pub fn is_validator(&self) -> bool {
		self.role == KeyRole::Validator
	}

	/// Name of the key in the backend.
	pub fn identifier(&self) -> String {
		match (self.is_validator(), &self.chain, self.index) {
			(true, Some(chain), Some(index)) => format!(
				"{}-key-{}-{}-{}",
				self.environment, chain, self.role, index
			),
			_ => format!("{}-key-{}", self.environment, self.role),
		}
	}

	fn labels(&self) -> KeyLabels {
		let mut labels = KeyLabels::new();
		labels.insert("environment".into(), self.environment.clone());
		labels.insert("role".into(), self.role.to_string());
		if self.is_validator() {
			if let Some(chain) = &self.chain {
				labels.insert("chain".into(), chain.clone());
			}
			if let Some(index) = self.index {
				labels.insert("index".into(), index.to_string());
			}
		}
		labels
	}
}

/// Key document as stored in a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedKey {
	#[serde(serialize_with = "serialize_exposed")]
	pub private_key: SecretString,
	pub address: String,
	pub role: KeyRole,
	pub environment: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain_name: Option<String>,
}

// Backends must persist the real key material, unlike logs.
fn serialize_exposed<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
	secret.with_exposed(|s| serializer.serialize_str(s))
}

/// Storage for key documents (a secret manager in production).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyBackend: Send + Sync {
	/// Loads the key stored under `identifier`.
	///
	/// Fails with [`AccountError::KeyNotFound`] when nothing is stored.
	async fn fetch(&self, identifier: &str) -> Result<PersistedKey, AccountError>;

	/// Stores (or replaces) the key under `identifier`.
	async fn store(
		&self,
		identifier: &str,
		key: &PersistedKey,
		labels: &KeyLabels,
	) -> Result<(), AccountError>;

	/// Removes the key stored under `identifier`.
	async fn delete(&self, identifier: &str) -> Result<(), AccountError>;
}

/// Fetch state of a remote key.
#[derive(Debug, Clone)]
pub enum RemoteKey {
	Unfetched,
	Fetched {
		address: Address,
		private_key: SecretString,
	},
}

/// Public view of a fetched key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAddress {
	pub identifier: String,
	pub address: Address,
}

/// A signing key held in a [`KeyBackend`], fetched lazily.
pub struct ManagedKey {
	identity: KeyIdentity,
	backend: Arc<dyn KeyBackend>,
	state: RemoteKey,
}

impl ManagedKey {
	pub fn new(identity: KeyIdentity, backend: Arc<dyn KeyBackend>) -> Self {
		Self {
			identity,
			backend,
			state: RemoteKey::Unfetched,
		}
	}

	pub fn identity(&self) -> &KeyIdentity {
		&self.identity
	}

	pub fn identifier(&self) -> String {
		self.identity.identifier()
	}

	pub fn is_fetched(&self) -> bool {
		matches!(self.state, RemoteKey::Fetched { .. })
	}

	/// Loads the key from the backend.
	///
	/// The stored address must match the one derived from the private key.
	pub async fn fetch(&mut self) -> Result<(), AccountError> {
		let identifier = self.identifier();
		let persisted = self.backend.fetch(&identifier).await?;

		let signer = signer_from_secret(&persisted.private_key)?;
		let stored = Address::from_str(&persisted.address).map_err(|e| {
			AccountError::InvalidKey(format!("{} has a malformed address: {}", identifier, e))
		})?;
		if stored != signer.address() {
			return Err(AccountError::InvalidKey(format!(
				"{} stores address {} but its key controls {}",
				identifier,
				stored,
				signer.address()
			)));
		}

		tracing::debug!(key = %identifier, address = %stored, "Fetched key");
		self.state = RemoteKey::Fetched {
			address: stored,
			private_key: persisted.private_key,
		};
		Ok(())
	}

	/// Generates a fresh key and stores it under this identity.
	pub async fn create(&mut self) -> Result<(), AccountError> {
		self.state = self.generate(false).await?;
		Ok(())
	}

	/// Fetches the key, creating it only when the backend has none.
	pub async fn create_if_not_exists(&mut self) -> Result<(), AccountError> {
		match self.fetch().await {
			Ok(()) => Ok(()),
			Err(AccountError::KeyNotFound(_)) => self.create().await,
			Err(e) => Err(e),
		}
	}

	/// Replaces the stored key with a fresh one and returns the new address.
	pub async fn rotate(&mut self) -> Result<Address, AccountError> {
		self.state = self.generate(true).await?;
		self.address()
	}

	/// Deletes the stored key. The handle returns to the unfetched state.
	pub async fn delete(&mut self) -> Result<(), AccountError> {
		let identifier = self.identifier();
		self.backend.delete(&identifier).await?;
		self.state = RemoteKey::Unfetched;
		tracing::info!(key = %identifier, "Deleted key");
		Ok(())
	}

	pub fn address(&self) -> Result<Address, AccountError> {
		match &self.state {
			RemoteKey::Fetched { address, .. } => Ok(*address),
			RemoteKey::Unfetched => Err(AccountError::KeyNotFetched(self.identifier())),
		}
	}

	pub fn private_key(&self) -> Result<&SecretString, AccountError> {
		match &self.state {
			RemoteKey::Fetched { private_key, .. } => Ok(private_key),
			RemoteKey::Unfetched => Err(AccountError::KeyNotFetched(self.identifier())),
		}
	}

	pub fn serialize_as_address(&self) -> Result<KeyAddress, AccountError> {
		Ok(KeyAddress {
			identifier: self.identifier(),
			address: self.address()?,
		})
	}

	async fn generate(&self, rotate: bool) -> Result<RemoteKey, AccountError> {
		let signer = PrivateKeySigner::random();
		let address = signer.address();
		let private_key = SecretString::new(with_0x_prefix(&hex::encode(signer.to_bytes())));
		let identifier = self.identifier();

		let persisted = PersistedKey {
			private_key: private_key.clone(),
			address: address.to_checksum(None),
			role: self.identity.role,
			environment: self.identity.environment.clone(),
			chain_name: self
				.identity
				.is_validator()
				.then(|| self.identity.chain.clone())
				.flatten(),
		};

		let mut labels = self.identity.labels();
		if rotate {
			labels.insert("rotated".into(), "true".into());
		}

		self.backend.store(&identifier, &persisted, &labels).await?;
		tracing::info!(key = %identifier, %address, rotate, "Stored new key");

		Ok(RemoteKey::Fetched {
			address,
			private_key,
		})
	}
}

/// Parses a hex private key into a local signer.
pub(crate) fn signer_from_secret(secret: &SecretString) -> Result<PrivateKeySigner, AccountError> {
	secret.with_exposed(|key| {
		PrivateKeySigner::from_str(without_0x_prefix(key))
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))
	})
}
