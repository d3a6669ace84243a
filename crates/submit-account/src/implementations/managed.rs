//! Account whose key lives in a key backend.
//!
//! The key is fetched on first use and cached for the rest of the run. With
//! `create_if_missing = true` a missing key is generated instead of failing,
//! which is how fresh environments get their deployer and relayer keys.

use crate::key::{signer_from_secret, KeyIdentity, KeyRole, ManagedKey};
use crate::{create_key_backend, AccountContext, AccountError, AccountFactory, AccountInterface};
use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use std::str::FromStr;
use submit_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, ValidationError,
};
use tokio::sync::{Mutex, OnceCell};

struct Unlocked {
	signer: PrivateKeySigner,
	private_key: SecretString,
}

/// Account that resolves its key lazily from a [`ManagedKey`].
pub struct ManagedAccount {
	key: Mutex<ManagedKey>,
	create_if_missing: bool,
	unlocked: OnceCell<Unlocked>,
}

impl ManagedAccount {
	pub fn new(key: ManagedKey, create_if_missing: bool) -> Self {
		Self {
			key: Mutex::new(key),
			create_if_missing,
			unlocked: OnceCell::new(),
		}
	}

	async fn unlocked(&self) -> Result<&Unlocked, AccountError> {
		self.unlocked
			.get_or_try_init(|| async {
				let mut key = self.key.lock().await;
				if !key.is_fetched() {
					if self.create_if_missing {
						key.create_if_not_exists().await?;
					} else {
						key.fetch().await?;
					}
				}
				let private_key = key.private_key()?.clone();
				let signer = signer_from_secret(&private_key)?;
				tracing::debug!(key = %key.identifier(), address = %signer.address(), "Unlocked managed key");
				Ok::<_, AccountError>(Unlocked {
					signer,
					private_key,
				})
			})
			.await
	}
}

#[async_trait]
impl AccountInterface for ManagedAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ManagedAccountSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.unlocked().await?.signer.address())
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError> {
		let signature = self
			.unlocked()
			.await?
			.signer
			.sign_hash(hash)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(Bytes::copy_from_slice(&signature.as_bytes()))
	}

	async fn private_key(&self) -> Result<SecretString, AccountError> {
		Ok(self.unlocked().await?.private_key.clone())
	}
}

/// Configuration schema for the managed account.
pub struct ManagedAccountSchema;

impl ConfigSchema for ManagedAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("backend", FieldType::String),
				Field::new("role", FieldType::String).with_validator(|value| {
					KeyRole::from_str(value.as_str().unwrap_or_default())
						.map(|_| ())
						.map_err(|e| e.to_string())
				}),
			],
			vec![
				Field::new(
					"index",
					FieldType::Integer {
						min: Some(0),
						max: Some(u32::MAX as i64),
					},
				),
				Field::new("create_if_missing", FieldType::Boolean),
				Field::new("key_directory", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a managed account.
///
/// Configuration parameters:
/// - `backend`: key backend name ("memory" or "file")
/// - `role`: key role ("validator", "relayer", "deployer", "submitter")
/// - `index`: validator index, required for validator keys
/// - `create_if_missing`: generate the key when the backend has none
///
/// Validator keys are bound to the chain in `context`.
pub fn create_account(
	config: &toml::Value,
	context: &AccountContext,
) -> Result<Box<dyn AccountInterface>, AccountError> {
	ManagedAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidConfig(e.to_string()))?;

	let role = KeyRole::from_str(config.get("role").and_then(|v| v.as_str()).unwrap_or_default())?;
	let index = config
		.get("index")
		.and_then(|v| v.as_integer())
		.map(|i| i as u32);
	let create_if_missing = config
		.get("create_if_missing")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	let identity = KeyIdentity::from_parts(&context.environment, role, context.chain.clone(), index)?;
	let backend = create_key_backend(config)?;

	Ok(Box::new(ManagedAccount::new(
		ManagedKey::new(identity, backend),
		create_if_missing,
	)))
}

/// Registry for the managed account.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "managed";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::{KeyBackend, MockKeyBackend, PersistedKey};
	use std::sync::Arc;

	const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[tokio::test]
	async fn test_fetches_once_and_caches() {
		let mut backend = MockKeyBackend::new();
		backend.expect_fetch().times(1).returning(|_| {
			Ok(PersistedKey {
				private_key: SecretString::from(DEV_KEY),
				address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
				role: KeyRole::Relayer,
				environment: "test".into(),
				chain_name: None,
			})
		});

		let backend: Arc<dyn KeyBackend> = Arc::new(backend);
		let account = ManagedAccount::new(
			ManagedKey::new(KeyIdentity::new("test", KeyRole::Relayer), backend),
			false,
		);

		let first = account.address().await.unwrap();
		let second = account.address().await.unwrap();
		assert_eq!(first, second);
		assert_eq!(account.private_key().await.unwrap().expose_secret(), DEV_KEY);
		assert_eq!(account.sign_hash(&B256::ZERO).await.unwrap().len(), 65);
	}

	#[tokio::test]
	async fn test_missing_key_without_create_fails() {
		let mut backend = MockKeyBackend::new();
		backend
			.expect_fetch()
			.returning(|id| Err(AccountError::KeyNotFound(id.to_string())));

		let account = ManagedAccount::new(
			ManagedKey::new(KeyIdentity::new("test", KeyRole::Relayer), Arc::new(backend)),
			false,
		);
		assert!(matches!(
			account.address().await,
			Err(AccountError::KeyNotFound(id)) if id == "test-key-relayer"
		));
	}

	#[tokio::test]
	async fn test_factory_binds_validator_key_to_chain() {
		let config = toml::Value::Table(
			"backend = \"memory\"\nrole = \"validator\"\nindex = 1\ncreate_if_missing = true"
				.parse()
				.unwrap(),
		);

		let without_chain = AccountContext::new("test");
		assert!(create_account(&config, &without_chain).is_err());

		let context = AccountContext::new("test").for_chain("test1");
		let account = create_account(&config, &context).unwrap();
		assert!(account.address().await.is_ok());
	}
}
