//! Chain metadata types for multi-chain submission.
//!
//! Every chain a strategy may target is described by a [`ChainMetadata`]
//! entry keyed by its human-readable name (e.g. `"test1"`, `"sepolia"`).
//! The protocol family decides which submitter and transformer kinds are
//! available for the chain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Blockchain protocol family of a chain.
///
/// Transaction shapes and signing models differ per family, so submitter
/// implementations declare which families they support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
	/// EVM-compatible chains.
	Ethereum,
	/// Solana virtual machine chains.
	Sealevel,
	/// Cosmos SDK chains.
	Cosmos,
}

impl ProtocolType {
	/// Returns the configuration name of the protocol family.
	pub fn as_str(&self) -> &'static str {
		match self {
			ProtocolType::Ethereum => "ethereum",
			ProtocolType::Sealevel => "sealevel",
			ProtocolType::Cosmos => "cosmos",
		}
	}
}

impl fmt::Display for ProtocolType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProtocolType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ethereum" => Ok(Self::Ethereum),
			"sealevel" => Ok(Self::Sealevel),
			"cosmos" => Ok(Self::Cosmos),
			other => Err(format!("Unknown protocol type '{}'", other)),
		}
	}
}

/// Configuration for a single chain.
///
/// # Fields
///
/// * `protocol` - Protocol family of the chain
/// * `chain_id` - Native chain id used for signing (EIP-155 for EVM chains)
/// * `domain_id` - Messaging domain id, defaults to the chain id
/// * `rpc_url` - The HTTP(S) RPC endpoint used to broadcast and confirm
/// * `safe` - Default multisig (Safe) address for proposal submitters
/// * `safe_service_url` - Default Safe transaction service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChainMetadata {
	pub protocol: ProtocolType,
	pub chain_id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain_id: Option<u32>,
	pub rpc_url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub safe: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub safe_service_url: Option<String>,
}

impl ChainMetadata {
	/// Returns the messaging domain id of the chain.
	///
	/// Falls back to the chain id when no explicit domain is configured and
	/// the chain id fits in 32 bits.
	pub fn domain(&self) -> Option<u32> {
		self.domain_id.or_else(|| u32::try_from(self.chain_id).ok())
	}
}

/// Chains configuration mapping chain names to their metadata.
pub type ChainsConfig = HashMap<String, ChainMetadata>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_protocol_type_round_trips_through_config_name() {
		for protocol in [
			ProtocolType::Ethereum,
			ProtocolType::Sealevel,
			ProtocolType::Cosmos,
		] {
			assert_eq!(protocol.as_str().parse::<ProtocolType>(), Ok(protocol));
		}
		assert!("bitcoin".parse::<ProtocolType>().is_err());
	}

	#[test]
	fn test_domain_falls_back_to_chain_id() {
		let mut metadata = ChainMetadata {
			protocol: ProtocolType::Ethereum,
			chain_id: 31337,
			domain_id: None,
			rpc_url: "http://localhost:8545".to_string(),
			safe: None,
			safe_service_url: None,
		};
		assert_eq!(metadata.domain(), Some(31337));

		metadata.domain_id = Some(7);
		assert_eq!(metadata.domain(), Some(7));

		metadata.domain_id = None;
		metadata.chain_id = u64::MAX;
		assert_eq!(metadata.domain(), None);
	}
}
