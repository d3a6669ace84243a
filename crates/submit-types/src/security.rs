//! Security-module configuration consumed by multisig-based submitters.
//!
//! The validator sets and thresholds are defined elsewhere; this crate only
//! carries them as input values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A validator set with the number of signatures required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigConfig {
	pub validators: Vec<String>,
	pub threshold: u32,
}

impl MultisigConfig {
	/// Checks that the threshold is reachable with the configured validators.
	pub fn validate(&self) -> Result<(), String> {
		if self.threshold == 0 {
			return Err("threshold must be at least 1".into());
		}
		if self.threshold as usize > self.validators.len() {
			return Err(format!(
				"threshold {} exceeds validator count {}",
				self.threshold,
				self.validators.len()
			));
		}
		Ok(())
	}
}

/// Per-chain security-module configuration, keyed by chain name.
pub type SecurityModuleConfig = HashMap<String, MultisigConfig>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_threshold_bounds() {
		let mut config = MultisigConfig {
			validators: vec!["0x15d34AAf54267DB7D7c367839AAf71A00a2C6A65".into()],
			threshold: 1,
		};
		assert!(config.validate().is_ok());

		config.threshold = 0;
		assert!(config.validate().is_err());

		config.threshold = 2;
		assert!(config
			.validate()
			.unwrap_err()
			.contains("exceeds validator count 1"));
	}
}
