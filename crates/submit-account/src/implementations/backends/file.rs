//! File-based key backend.
//!
//! Each key is one JSON document `<directory>/<identifier>.json` holding the
//! persisted key and its labels. Files are written with owner-only
//! permissions on unix.

use crate::key::{KeyBackend, KeyLabels, PersistedKey};
use crate::{AccountError, KeyBackendFactory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use submit_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};

#[derive(Serialize, Deserialize)]
struct KeyDocument {
	key: PersistedKey,
	#[serde(default)]
	labels: KeyLabels,
}

/// Key store backed by one JSON file per key.
pub struct FileKeyBackend {
	directory: PathBuf,
}

impl FileKeyBackend {
	pub fn new(directory: impl Into<PathBuf>) -> Self {
		Self {
			directory: directory.into(),
		}
	}

	fn path_for(&self, identifier: &str) -> Result<PathBuf, AccountError> {
		let valid = !identifier.is_empty()
			&& identifier
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
		if !valid {
			return Err(AccountError::InvalidKey(format!(
				"'{}' is not a valid key identifier",
				identifier
			)));
		}
		Ok(self.directory.join(format!("{}.json", identifier)))
	}
}

#[async_trait]
impl KeyBackend for FileKeyBackend {
	async fn fetch(&self, identifier: &str) -> Result<PersistedKey, AccountError> {
		let path = self.path_for(identifier)?;
		let content = match tokio::fs::read(&path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(AccountError::KeyNotFound(identifier.to_string()))
			},
			Err(e) => return Err(AccountError::Backend(e.to_string())),
		};

		let document: KeyDocument = serde_json::from_slice(&content)
			.map_err(|e| AccountError::Backend(format!("{}: {}", path.display(), e)))?;
		Ok(document.key)
	}

	async fn store(
		&self,
		identifier: &str,
		key: &PersistedKey,
		labels: &KeyLabels,
	) -> Result<(), AccountError> {
		let path = self.path_for(identifier)?;
		tokio::fs::create_dir_all(&self.directory)
			.await
			.map_err(|e| AccountError::Backend(e.to_string()))?;

		let document = KeyDocument {
			key: key.clone(),
			labels: labels.clone(),
		};
		let content = serde_json::to_vec_pretty(&document)
			.map_err(|e| AccountError::Backend(e.to_string()))?;

		// Write to a temp file first so a crash never leaves half a key behind.
		let temp_path = path.with_extension("json.tmp");
		tokio::fs::write(&temp_path, content)
			.await
			.map_err(|e| AccountError::Backend(e.to_string()))?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
				.await
				.map_err(|e| AccountError::Backend(e.to_string()))?;
		}

		tokio::fs::rename(&temp_path, &path)
			.await
			.map_err(|e| AccountError::Backend(e.to_string()))
	}

	async fn delete(&self, identifier: &str) -> Result<(), AccountError> {
		let path = self.path_for(identifier)?;
		match tokio::fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(AccountError::KeyNotFound(identifier.to_string()))
			},
			Err(e) => Err(AccountError::Backend(e.to_string())),
		}
	}
}

/// Configuration schema for the file backend.
pub struct FileKeyBackendSchema;

impl ConfigSchema for FileKeyBackendSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![], vec![Field::new("key_directory", FieldType::String)]);
		schema.validate(config)
	}
}

/// Factory function to create a file key backend.
///
/// Configuration parameters:
/// - `key_directory`: directory holding key documents (default: "./data/keys")
pub fn create_backend(config: &toml::Value) -> Result<Box<dyn KeyBackend>, AccountError> {
	FileKeyBackendSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidConfig(e.to_string()))?;

	let directory = config
		.get("key_directory")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/keys");
	Ok(Box::new(FileKeyBackend::new(directory)))
}

/// Registry for the file key backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
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
	use tempfile::TempDir;

	fn sample() -> PersistedKey {
		PersistedKey {
			private_key: SecretString::from(
				"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
			),
			address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
			role: KeyRole::Validator,
			environment: "test".into(),
			chain_name: Some("test1".into()),
		}
	}

	#[tokio::test]
	async fn test_key_survives_new_backend_instance() {
		let temp_dir = TempDir::new().unwrap();
		let mut labels = KeyLabels::new();
		labels.insert("chain".into(), "test1".into());

		FileKeyBackend::new(temp_dir.path())
			.store("test-key-test1-validator-0", &sample(), &labels)
			.await
			.unwrap();

		let reopened = FileKeyBackend::new(temp_dir.path());
		let key = reopened.fetch("test-key-test1-validator-0").await.unwrap();
		assert_eq!(key, sample());

		let raw = std::fs::read_to_string(temp_dir.path().join("test-key-test1-validator-0.json"))
			.unwrap();
		assert!(raw.contains("\"chain\": \"test1\""));
	}

	#[tokio::test]
	async fn test_missing_and_invalid_identifiers() {
		let temp_dir = TempDir::new().unwrap();
		let backend = FileKeyBackend::new(temp_dir.path());

		assert!(matches!(
			backend.fetch("test-key-relayer").await,
			Err(AccountError::KeyNotFound(_))
		));
		assert!(matches!(
			backend.fetch("../escape").await,
			Err(AccountError::InvalidKey(_))
		));
		assert!(matches!(
			backend.delete("test-key-relayer").await,
			Err(AccountError::KeyNotFound(_))
		));
	}

	#[test]
	fn test_factory_validates_config() {
		let bad: toml::Value = toml::Value::Table("key_directory = 5".parse().unwrap());
		assert!(create_backend(&bad).is_err());

		let good: toml::Value = toml::Value::Table("key_directory = \"/tmp/keys\"".parse().unwrap());
		assert!(create_backend(&good).is_ok());
	}
}
