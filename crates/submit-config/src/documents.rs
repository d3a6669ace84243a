//! Per-run documents: submission strategies, transaction batches and receipts.
//!
//! Documents are YAML unless the path ends in `.json`. Since YAML is a
//! superset of JSON, JSON content in a `.yaml` file still loads.

use crate::ConfigError;
use serde::Serialize;
use std::path::Path;
use submit_types::SubmissionStrategy;

/// Serialization format of a document, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
	Yaml,
	Json,
}

impl DocumentFormat {
	/// Picks the format for a path: JSON for `.json`, YAML otherwise.
	pub fn for_path(path: &Path) -> Self {
		match path.extension().and_then(|ext| ext.to_str()) {
			Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
			_ => DocumentFormat::Yaml,
		}
	}

	fn parse<T: serde::de::DeserializeOwned>(self, content: &str) -> Result<T, ConfigError> {
		match self {
			DocumentFormat::Json => {
				serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
			},
			DocumentFormat::Yaml => {
				serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
			},
		}
	}

	fn render<T: Serialize>(self, value: &T) -> Result<String, ConfigError> {
		match self {
			DocumentFormat::Json => {
				serde_json::to_string_pretty(value).map_err(|e| ConfigError::Parse(e.to_string()))
			},
			DocumentFormat::Yaml => {
				serde_yaml::to_string(value).map_err(|e| ConfigError::Parse(e.to_string()))
			},
		}
	}
}

/// Loads a submission strategy document.
pub async fn load_strategy(path: impl AsRef<Path>) -> Result<SubmissionStrategy, ConfigError> {
	let path = path.as_ref();
	let content = tokio::fs::read_to_string(path).await?;
	let strategy: SubmissionStrategy = DocumentFormat::for_path(path).parse(&content)?;

	if strategy.chain.trim().is_empty() {
		return Err(ConfigError::Validation(format!(
			"Strategy {} does not name a chain",
			path.display()
		)));
	}

	tracing::debug!(
		path = %path.display(),
		chain = %strategy.chain,
		submitter = %strategy.submitter.kind,
		transforms = strategy.transforms.len(),
		"Loaded submission strategy"
	);
	Ok(strategy)
}

/// Loads the raw entries of a transaction batch document.
///
/// The document is either a list of transaction descriptors or a mapping with
/// a `transactions` list. Entries are returned unvalidated so the caller can
/// report every malformed index at once.
pub async fn load_transactions(
	path: impl AsRef<Path>,
) -> Result<Vec<serde_json::Value>, ConfigError> {
	let path = path.as_ref();
	let content = tokio::fs::read_to_string(path).await?;
	let document: serde_json::Value = DocumentFormat::for_path(path).parse(&content)?;

	let entries = match document {
		serde_json::Value::Array(entries) => entries,
		serde_json::Value::Object(mut map) => match map.remove("transactions") {
			Some(serde_json::Value::Array(entries)) => entries,
			_ => {
				return Err(ConfigError::Validation(format!(
					"{} must contain a 'transactions' list",
					path.display()
				)))
			},
		},
		_ => {
			return Err(ConfigError::Validation(format!(
				"{} must be a list of transactions",
				path.display()
			)))
		},
	};

	tracing::debug!(path = %path.display(), count = entries.len(), "Loaded transaction batch");
	Ok(entries)
}

/// Writes a value to `path`, creating parent directories as needed.
pub async fn write_document<T: Serialize>(
	path: impl AsRef<Path>,
	value: &T,
) -> Result<(), ConfigError> {
	let path = path.as_ref();
	let rendered = DocumentFormat::for_path(path).render(value)?;

	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			tokio::fs::create_dir_all(parent).await?;
		}
	}
	tokio::fs::write(path, rendered).await?;
	Ok(())
}
