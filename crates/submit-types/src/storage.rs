//! Storage-related types for the submission system.

use std::str::FromStr;

/// Storage namespaces.
///
/// Replaces string literals in storage operations with strongly typed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing run reports
	Runs,
	/// Key for indexing receipts by transaction hash
	ReceiptByTxHash,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Runs => "runs",
			StorageKey::ReceiptByTxHash => "receipt_by_tx_hash",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Runs, Self::ReceiptByTxHash].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"runs" => Ok(Self::Runs),
			"receipt_by_tx_hash" => Ok(Self::ReceiptByTxHash),
			_ => Err(()),
		}
	}
}
