//! File-based storage backend.
//!
//! Each entry is one file `<storage_path>/<namespace>/<id>.bin`: a fixed
//! 16-byte header followed by the JSON payload. The header records when the
//! entry expires so stale run reports can age out.

use crate::{StorageError, StorageFactory, StorageInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use submit_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey,
	ValidationError,
};
use tokio::fs;

/// Entry header.
///
/// Layout (16 bytes):
/// - `[0..4]`: magic `SUBM`
/// - `[4..6]`: format version, u16 little-endian
/// - `[6..14]`: expiry as Unix seconds, u64 little-endian, 0 for never
/// - `[14..16]`: reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryHeader {
	expires_at: u64,
}

impl EntryHeader {
	const MAGIC: &'static [u8; 4] = b"SUBM";
	const VERSION: u16 = 1;
	const SIZE: usize = 16;

	fn with_ttl(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs())
		};
		Self { expires_at }
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing entry header".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported entry version: {}",
				version
			)));
		}

		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttls: HashMap<StorageKey, Duration>,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttls: HashMap<StorageKey, Duration>) -> Self {
		Self { base_path, ttls }
	}

	/// Maps `namespace:id` to `<base>/<namespace>/<id>.bin`.
	fn entry_path(&self, key: &str) -> PathBuf {
		let sanitize = |part: &str| part.replace(['/', '\\', ':', '.'], "_");
		match key.split_once(':') {
			Some((namespace, id)) => self
				.base_path
				.join(sanitize(namespace))
				.join(format!("{}.bin", sanitize(id))),
			None => self.base_path.join(format!("{}.bin", sanitize(key))),
		}
	}

	fn default_ttl(&self, key: &str) -> Duration {
		key.split_once(':')
			.and_then(|(namespace, _)| namespace.parse::<StorageKey>().ok())
			.and_then(|namespace| self.ttls.get(&namespace).copied())
			.unwrap_or(Duration::ZERO)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let data = match fs::read(self.entry_path(key)).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = EntryHeader::decode(&data)?;
		if header.is_expired() {
			tracing::debug!(key = %key, expires_at = header.expires_at, "Skipping expired entry");
			return Err(StorageError::NotFound);
		}
		Ok(data[EntryHeader::SIZE..].to_vec())
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.entry_path(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let header = EntryHeader::with_ttl(ttl.unwrap_or_else(|| self.default_ttl(key)));
		let mut contents = Vec::with_capacity(EntryHeader::SIZE + value.len());
		contents.extend_from_slice(&header.encode());
		contents.extend_from_slice(&value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, contents)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.entry_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		for namespace in StorageKey::all() {
			optional.push(Field::new(
				format!("ttl_{}", namespace.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(vec![], optional).validate(config)
	}
}

/// Factory function to create a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
/// - `ttl_runs`: seconds to keep run reports (default: 0, forever)
/// - `ttl_receipt_by_tx_hash`: seconds to keep the receipt index (default: 0)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	let ttls = StorageKey::all()
		.filter_map(|namespace| {
			config
				.get(format!("ttl_{}", namespace.as_str()))
				.and_then(|v| v.as_integer())
				.map(|secs| (namespace, Duration::from_secs(secs as u64)))
		})
		.collect();

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path), ttls)))
}

/// Registry for the file storage backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
