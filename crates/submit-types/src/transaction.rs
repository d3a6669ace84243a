//! Protocol-neutral transaction values.
//!
//! A [`TransactionValue`] is the unsigned description of one call a
//! submission pipeline must land on chain. It carries no signature and no
//! protocol-specific typing: addresses are kept as strings and are only
//! parsed by the submitter that consumes them.

use alloy_primitives::{Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Error raised when a batch entry does not conform to the transaction shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Transaction {index} is invalid: {reason}")]
pub struct TransactionSchemaError {
	/// Zero-based position of the entry in the batch.
	pub index: usize,
	/// Why the entry was rejected.
	pub reason: String,
}

/// Optional hints a producer may attach to a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHints {
	/// Gas limit to use instead of an estimate.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_limit: Option<u64>,
	/// Nonce to use instead of the signer's pending nonce.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<u64>,
}

/// An unsigned, protocol-neutral transaction descriptor.
///
/// Values are immutable once constructed. Transformers never mutate a value,
/// they build new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionValue {
	/// Name of the chain the transaction targets.
	pub chain: String,
	/// Destination address or contract.
	pub to: String,
	/// Opaque call data.
	#[serde(default)]
	pub data: Bytes,
	/// Native value to transfer, in the chain's smallest unit.
	#[serde(default, deserialize_with = "deserialize_amount")]
	pub value: U256,
	/// Gas and nonce hints.
	#[serde(default, flatten)]
	pub hints: TransactionHints,
}

impl TransactionValue {
	/// Creates a call with no value and no hints.
	pub fn new(chain: impl Into<String>, to: impl Into<String>, data: impl Into<Bytes>) -> Self {
		Self {
			chain: chain.into(),
			to: to.into(),
			data: data.into(),
			value: U256::ZERO,
			hints: TransactionHints::default(),
		}
	}

	/// Returns a copy of this transaction carrying the given value.
	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}

	/// Returns a copy of this transaction carrying the given gas limit hint.
	pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
		self.hints.gas_limit = Some(gas_limit);
		self
	}

	/// Parses one batch entry, checking it conforms to the transaction shape.
	///
	/// Only the generic shape is checked here: required fields present, hex
	/// call data, numeric value, non-empty chain and destination.
	pub fn from_json(index: usize, entry: &serde_json::Value) -> Result<Self, TransactionSchemaError> {
		let tx = Self::deserialize(entry).map_err(|e| TransactionSchemaError {
			index,
			reason: e.to_string(),
		})?;

		if tx.chain.trim().is_empty() {
			return Err(TransactionSchemaError {
				index,
				reason: "chain cannot be empty".into(),
			});
		}
		if tx.to.trim().is_empty() {
			return Err(TransactionSchemaError {
				index,
				reason: "to cannot be empty".into(),
			});
		}

		Ok(tx)
	}
}

/// A transaction ready for submission, tagged with the input it derives from.
///
/// Transforms may expand one input into several staged transactions; all of
/// them carry the same `source_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTransaction {
	/// Zero-based position of the originating entry in the input batch.
	pub source_index: usize,
	pub transaction: TransactionValue,
}

impl StagedTransaction {
	pub fn new(source_index: usize, transaction: TransactionValue) -> Self {
		Self {
			source_index,
			transaction,
		}
	}

	/// Stages a batch one-to-one, in input order.
	pub fn from_batch(transactions: Vec<TransactionValue>) -> Vec<Self> {
		transactions
			.into_iter()
			.enumerate()
			.map(|(index, tx)| Self::new(index, tx))
			.collect()
	}
}

/// Parses every entry of a batch, collecting the index of each offending entry.
///
/// Returns all schema errors rather than the first one, so an operator can fix
/// a batch in one pass.
pub fn parse_batch(entries: &[serde_json::Value]) -> Result<Vec<TransactionValue>, Vec<TransactionSchemaError>> {
	let mut transactions = Vec::with_capacity(entries.len());
	let mut errors = Vec::new();

	for (index, entry) in entries.iter().enumerate() {
		match TransactionValue::from_json(index, entry) {
			Ok(tx) => transactions.push(tx),
			Err(e) => errors.push(e),
		}
	}

	if errors.is_empty() {
		Ok(transactions)
	} else {
		Err(errors)
	}
}

/// Accepts an amount as a JSON number, a decimal string or a `0x` hex string.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Amount {
		Number(u64),
		Text(String),
	}

	match Amount::deserialize(deserializer)? {
		Amount::Number(n) => Ok(U256::from(n)),
		Amount::Text(s) => U256::from_str(s.trim())
			.map_err(|e| serde::de::Error::custom(format!("invalid amount '{}': {}", s, e))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_parses_minimal_transaction() {
		let entry = json!({
			"chain": "test1",
			"to": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
			"data": "0xdeadbeef"
		});

		let tx = TransactionValue::from_json(0, &entry).unwrap();
		assert_eq!(tx.chain, "test1");
		assert_eq!(tx.data.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
		assert_eq!(tx.value, U256::ZERO);
		assert_eq!(tx.hints, TransactionHints::default());
	}

	#[test]
	fn test_value_accepts_number_decimal_and_hex() {
		for (raw, expected) in [
			(json!(5), 5u64),
			(json!("1000"), 1000),
			(json!("0x10"), 16),
		] {
			let entry = json!({ "chain": "test1", "to": "0x01", "value": raw });
			let tx = TransactionValue::from_json(0, &entry).unwrap();
			assert_eq!(tx.value, U256::from(expected));
		}
	}

	#[test]
	fn test_hints_are_flattened() {
		let entry = json!({
			"chain": "test1",
			"to": "0x01",
			"gasLimit": 21000,
			"nonce": 4
		});

		let tx = TransactionValue::from_json(0, &entry).unwrap();
		assert_eq!(tx.hints.gas_limit, Some(21000));
		assert_eq!(tx.hints.nonce, Some(4));
	}

	#[test]
	fn test_rejects_malformed_entries_with_index() {
		let missing_to = json!({ "chain": "test1", "data": "0x" });
		let err = TransactionValue::from_json(3, &missing_to).unwrap_err();
		assert_eq!(err.index, 3);
		assert!(err.reason.contains("to"));

		let bad_data = json!({ "chain": "test1", "to": "0x01", "data": "not-hex" });
		assert!(TransactionValue::from_json(0, &bad_data).is_err());

		let empty_chain = json!({ "chain": " ", "to": "0x01" });
		let err = TransactionValue::from_json(1, &empty_chain).unwrap_err();
		assert_eq!(err.reason, "chain cannot be empty");
	}

	#[test]
	fn test_parse_batch_reports_every_offending_index() {
		let entries = vec![
			json!({ "chain": "test1", "to": "0x01" }),
			json!({ "chain": "test1" }),
			json!({ "chain": "test1", "to": "0x02" }),
			json!("not an object"),
		];

		let errors = parse_batch(&entries).unwrap_err();
		let indices: Vec<usize> = errors.iter().map(|e| e.index).collect();
		assert_eq!(indices, vec![1, 3]);
	}
}
