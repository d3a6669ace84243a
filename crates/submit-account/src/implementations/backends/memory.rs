//! In-memory key backend.
//!
//! Keys live only as long as the process. Used for tests and local
//! development against throwaway chains.

use crate::key::{KeyBackend, KeyLabels, PersistedKey};
use crate::{AccountError, KeyBackendFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use submit_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use tokio::sync::RwLock;

/// In-memory key store.
pub struct MemoryKeyBackend {
	keys: Arc<RwLock<HashMap<String, (PersistedKey, KeyLabels)>>>,
}

impl MemoryKeyBackend {
	pub fn new() -> Self {
		Self {
			keys: Arc::new(RwLock::new(HashMap::new())),
		}
	}

	/// Labels stored alongside a key, if present.
	pub async fn labels(&self, identifier: &str) -> Option<KeyLabels> {
		self.keys
			.read()
			.await
			.get(identifier)
			.map(|(_, labels)| labels.clone())
	}
}

impl Default for MemoryKeyBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl KeyBackend for MemoryKeyBackend {
	async fn fetch(&self, identifier: &str) -> Result<PersistedKey, AccountError> {
		self.keys
			.read()
			.await
			.get(identifier)
			.map(|(key, _)| key.clone())
			.ok_or_else(|| AccountError::KeyNotFound(identifier.to_string()))
	}

	async fn store(
		&self,
		identifier: &str,
		key: &PersistedKey,
		labels: &KeyLabels,
	) -> Result<(), AccountError> {
		self.keys
			.write()
			.await
			.insert(identifier.to_string(), (key.clone(), labels.clone()));
		Ok(())
	}

	async fn delete(&self, identifier: &str) -> Result<(), AccountError> {
		match self.keys.write().await.remove(identifier) {
			Some(_) => Ok(()),
			None => Err(AccountError::KeyNotFound(identifier.to_string())),
		}
	}
}

/// Configuration schema for the memory backend.
pub struct MemoryKeyBackendSchema;

impl ConfigSchema for MemoryKeyBackendSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory key backend.
pub fn create_backend(config: &toml::Value) -> Result<Box<dyn KeyBackend>, AccountError> {
	MemoryKeyBackendSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidConfig(e.to_string()))?;
	Ok(Box::new(MemoryKeyBackend::new()))
}

/// Registry for the memory key backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = KeyBackendFactory;

	fn factory() -> Self::Factory {
		create_backend
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::KeyRole;
	use submit_types::SecretString;

	fn sample() -> PersistedKey {
		PersistedKey {
			private_key: SecretString::from("0x01"),
			address: "0x0000000000000000000000000000000000000001".into(),
			role: KeyRole::Relayer,
			environment: "test".into(),
			chain_name: None,
		}
	}

	#[tokio::test]
	async fn test_store_fetch_delete() {
		let backend = MemoryKeyBackend::new();
		let mut labels = KeyLabels::new();
		labels.insert("role".into(), "relayer".into());

		backend.store("test-key-relayer", &sample(), &labels).await.unwrap();
		assert_eq!(backend.fetch("test-key-relayer").await.unwrap(), sample());
		assert_eq!(
			backend.labels("test-key-relayer").await.unwrap()["role"],
			"relayer"
		);

		backend.delete("test-key-relayer").await.unwrap();
		assert!(matches!(
			backend.fetch("test-key-relayer").await,
			Err(AccountError::KeyNotFound(_))
		));
		assert!(backend.delete("test-key-relayer").await.is_err());
	}
}
