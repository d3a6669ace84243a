//! Submission strategy documents.
//!
//! A strategy binds a target chain to one submitter and an ordered list of
//! transforms. Each submitter and transform entry is a discriminated union
//! written as `{type: <kind>, ...params}`; the parameters are kept as a raw
//! TOML table so every implementation validates them with its own
//! [`ConfigSchema`](crate::ConfigSchema).

use serde::{Deserialize, Serialize};

/// A `{type, ...params}` entry selecting one implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSpec {
	/// Implementation name, e.g. `"direct"` or `"interchain-account"`.
	#[serde(rename = "type")]
	pub kind: String,
	/// Implementation-specific parameters.
	#[serde(flatten)]
	pub params: toml::Table,
}

impl KindSpec {
	/// Creates a spec with no parameters.
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			params: toml::Table::new(),
		}
	}

	/// Adds a parameter, returning the updated spec.
	pub fn with_param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
		self.params.insert(key.to_string(), value.into());
		self
	}

	/// Returns the parameters as a TOML value for schema validation.
	pub fn params_value(&self) -> toml::Value {
		toml::Value::Table(self.params.clone())
	}
}

/// Declarative configuration selecting a submitter and transform chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStrategy {
	/// Target chain name.
	pub chain: String,
	/// The submitter that dispatches the batch.
	pub submitter: KindSpec,
	/// Transforms applied in order before submission.
	#[serde(default)]
	pub transforms: Vec<KindSpec>,
}

impl SubmissionStrategy {
	/// Creates a strategy with no transforms.
	pub fn new(chain: impl Into<String>, submitter: KindSpec) -> Self {
		Self {
			chain: chain.into(),
			submitter,
			transforms: Vec::new(),
		}
	}

	/// Appends a transform, returning the updated strategy.
	pub fn with_transform(mut self, transform: KindSpec) -> Self {
		self.transforms.push(transform);
		self
	}
}
