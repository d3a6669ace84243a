//! Transaction delivery types for the submission system.
//!
//! This module defines what comes back out of a submission: transaction
//! hashes, on-chain confirmations and the per-transaction [`Receipt`] that
//! the orchestrator persists and reports.

use crate::with_0x_prefix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blockchain transaction hash representation.
///
/// Stores transaction hashes as raw bytes to support different blockchain formats.
/// Serialized as a `0x`-prefixed hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHash(pub Vec<u8>);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

impl Serialize for TransactionHash {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for TransactionHash {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		hex::decode(crate::without_0x_prefix(&s))
			.map(TransactionHash)
			.map_err(serde::de::Error::custom)
	}
}

/// On-chain confirmation of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
}

/// What a submitter produced for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptOutcome {
	/// Signed, broadcast and confirmed on chain.
	Executed {
		hash: TransactionHash,
		block_number: u64,
	},
	/// Proposed to a multisig; execution needs `threshold` signatures.
	Proposed {
		proposal_id: String,
		safe: String,
		nonce: u64,
		threshold: u32,
	},
	/// Executed as part of a single batch dispatch shared with other receipts.
	Batched {
		hash: TransactionHash,
		block_number: u64,
		/// Position of the call inside the batch.
		position: usize,
		/// Number of calls in the batch.
		batch_size: usize,
	},
	/// Validated and simulated only. Nothing was broadcast.
	Simulated {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		gas_estimate: Option<u64>,
		/// Identifier the live submission would have produced, if known.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		reference: Option<String>,
	},
}

impl ReceiptOutcome {
	/// Returns true when the outcome is a dry-run simulation.
	pub fn is_simulated(&self) -> bool {
		matches!(self, ReceiptOutcome::Simulated { .. })
	}

	/// Returns the on-chain hash, for outcomes that have one.
	pub fn hash(&self) -> Option<&TransactionHash> {
		match self {
			ReceiptOutcome::Executed { hash, .. } | ReceiptOutcome::Batched { hash, .. } => {
				Some(hash)
			},
			_ => None,
		}
	}
}

/// Confirmation record for one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
	/// Zero-based index of the originating transaction in the input batch.
	pub transaction_index: usize,
	/// Chain the transaction was submitted to.
	pub chain: String,
	/// Submitter kind that produced this receipt.
	pub submitter: String,
	/// Chain-specific confirmation data.
	#[serde(flatten)]
	pub outcome: ReceiptOutcome,
}

impl Receipt {
	/// Short human-readable reference for logs.
	pub fn reference(&self) -> String {
		match &self.outcome {
			ReceiptOutcome::Executed { hash, .. } | ReceiptOutcome::Batched { hash, .. } => {
				hash.to_string()
			},
			ReceiptOutcome::Proposed { proposal_id, .. } => with_0x_prefix(proposal_id),
			ReceiptOutcome::Simulated { reference, .. } => reference
				.clone()
				.unwrap_or_else(|| "simulated".to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transaction_hash_serializes_as_hex() {
		let hash = TransactionHash(vec![0xab, 0xcd]);
		let json = serde_json::to_string(&hash).unwrap();
		assert_eq!(json, "\"0xabcd\"");

		let parsed: TransactionHash = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, hash);
	}

	#[test]
	fn test_receipt_flattens_outcome_with_status_tag() {
		let receipt = Receipt {
			transaction_index: 2,
			chain: "test1".into(),
			submitter: "multisig-proposal".into(),
			outcome: ReceiptOutcome::Proposed {
				proposal_id: "0x1234".into(),
				safe: "0x0000000000000000000000000000000000000001".into(),
				nonce: 7,
				threshold: 2,
			},
		};

		let value = serde_json::to_value(&receipt).unwrap();
		assert_eq!(value["status"], "proposed");
		assert_eq!(value["transaction_index"], 2);
		assert_eq!(value["threshold"], 2);
		assert!(receipt.outcome.hash().is_none());
		assert!(!receipt.outcome.is_simulated());
	}
}
