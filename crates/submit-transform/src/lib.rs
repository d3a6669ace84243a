//! Transaction transforms for the submission system.
//!
//! A transformer rewrites one transaction into one or more transactions
//! before a submitter sees them, for example to route a call through an
//! interchain account or a timelock. Transformers are pure: they never touch
//! the network and never mutate their input.

use submit_types::{
	ChainMetadata, ConfigSchema, ImplementationRegistry, ProtocolType, StagedTransaction,
	TransactionValue,
};
use thiserror::Error;
use tracing::debug;

/// Re-export implementations
pub mod implementations {
	pub mod interchain_account;
	pub mod timelock;
}

/// Errors that can occur while building or applying transformers.
#[derive(Debug, Error)]
pub enum TransformError {
	/// The transformer parameters were rejected.
	#[error("Invalid transformer configuration: {0}")]
	InvalidConfig(String),
	/// The transformer cannot rewrite this transaction.
	#[error("Transaction cannot be transformed: {0}")]
	Rejected(String),
	/// A stage of a chain failed for one input transaction.
	#[error("Transform '{kind}' failed for transaction {index}: {reason}")]
	Stage {
		kind: &'static str,
		index: usize,
		reason: String,
	},
}

/// Trait defining the interface for transformer implementations.
pub trait TransformerInterface: Send + Sync {
	/// The strategy kind tag this transformer was built for.
	fn kind(&self) -> &'static str;

	/// Returns the configuration schema for the transformer parameters.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Rewrites one transaction. The output is never empty.
	///
	/// `position` is the place of `tx` in the batch this stage receives and
	/// is unique within one application of the stage.
	fn transform(
		&self,
		position: usize,
		tx: &TransactionValue,
	) -> Result<Vec<TransactionValue>, TransformError>;
}

/// The chain a transformer is built for.
#[derive(Debug, Clone)]
pub struct TransformContext {
	pub chain: String,
	pub metadata: ChainMetadata,
}

/// Type alias for transformer factory functions.
pub type TransformerFactory =
	fn(&toml::Value, &TransformContext) -> Result<Box<dyn TransformerInterface>, TransformError>;

/// Registry trait for transformer implementations.
pub trait TransformerRegistry: ImplementationRegistry<Factory = TransformerFactory> {
	/// Protocol families the transformer can be applied on.
	const PROTOCOLS: &'static [ProtocolType];
}

/// A registered transformer kind.
#[derive(Clone, Copy)]
pub struct TransformerRegistration {
	pub kind: &'static str,
	pub protocols: &'static [ProtocolType],
	pub factory: TransformerFactory,
}

impl TransformerRegistration {
	fn of<R: TransformerRegistry>() -> Self {
		Self {
			kind: R::NAME,
			protocols: R::PROTOCOLS,
			factory: R::factory(),
		}
	}

	pub fn supports(&self, protocol: ProtocolType) -> bool {
		self.protocols.contains(&protocol)
	}
}

/// Get all registered transformer implementations.
pub fn get_all_implementations() -> Vec<TransformerRegistration> {
	use implementations::{interchain_account, timelock};

	vec![
		TransformerRegistration::of::<interchain_account::Registry>(),
		TransformerRegistration::of::<timelock::Registry>(),
	]
}

/// Ordered list of transformers applied left to right.
///
/// With stages `[A, B]` every input `x` becomes `B(A(x))`. Outputs keep the
/// index of the input they derive from.
#[derive(Default)]
pub struct TransformChain {
	stages: Vec<Box<dyn TransformerInterface>>,
}

impl TransformChain {
	pub fn new(stages: Vec<Box<dyn TransformerInterface>>) -> Self {
		Self { stages }
	}

	pub fn kinds(&self) -> Vec<&'static str> {
		self.stages.iter().map(|stage| stage.kind()).collect()
	}

	pub fn is_empty(&self) -> bool {
		self.stages.is_empty()
	}

	/// Applies every stage to a batch, staging the results.
	pub fn apply(
		&self,
		transactions: Vec<TransactionValue>,
	) -> Result<Vec<StagedTransaction>, TransformError> {
		let mut staged = StagedTransaction::from_batch(transactions);

		for stage in &self.stages {
			let mut next = Vec::with_capacity(staged.len());
			for (position, item) in staged.into_iter().enumerate() {
				let outputs = stage.transform(position, &item.transaction).map_err(|e| {
					TransformError::Stage {
						kind: stage.kind(),
						index: item.source_index,
						reason: e.to_string(),
					}
				})?;
				next.extend(
					outputs
						.into_iter()
						.map(|tx| StagedTransaction::new(item.source_index, tx)),
				);
			}
			debug!(kind = stage.kind(), count = next.len(), "Applied transform");
			staged = next;
		}

		Ok(staged)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::Bytes;
	use submit_types::{Schema, ValidationError};

	/// Appends a marker byte to the call data.
	struct Tag(u8, &'static str);

	struct NoParams;

	impl ConfigSchema for NoParams {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	impl TransformerInterface for Tag {
		fn kind(&self) -> &'static str {
			self.1
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoParams)
		}

		fn transform(
			&self,
			_position: usize,
			tx: &TransactionValue,
		) -> Result<Vec<TransactionValue>, TransformError> {
			let mut data = tx.data.to_vec();
			data.push(self.0);
			Ok(vec![TransactionValue {
				data: Bytes::from(data),
				..tx.clone()
			}])
		}
	}

	/// Emits every transaction twice.
	struct Split;

	impl TransformerInterface for Split {
		fn kind(&self) -> &'static str {
			"split"
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoParams)
		}

		fn transform(
			&self,
			_position: usize,
			tx: &TransactionValue,
		) -> Result<Vec<TransactionValue>, TransformError> {
			Ok(vec![tx.clone(), tx.clone()])
		}
	}

	struct Refuse;

	impl TransformerInterface for Refuse {
		fn kind(&self) -> &'static str {
			"refuse"
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoParams)
		}

		fn transform(
			&self,
			_position: usize,
			_tx: &TransactionValue,
		) -> Result<Vec<TransactionValue>, TransformError> {
			Err(TransformError::Rejected("no".into()))
		}
	}

	/// Replaces the call data with the position it was given.
	struct Position;

	impl TransformerInterface for Position {
		fn kind(&self) -> &'static str {
			"position"
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoParams)
		}

		fn transform(
			&self,
			position: usize,
			tx: &TransactionValue,
		) -> Result<Vec<TransactionValue>, TransformError> {
			Ok(vec![TransactionValue {
				data: Bytes::from(vec![position as u8]),
				..tx.clone()
			}])
		}
	}

	fn tx(byte: u8) -> TransactionValue {
		TransactionValue::new("test1", "0x01", Bytes::from(vec![byte]))
	}

	#[test]
	fn test_chain_composes_left_to_right() {
		let chain = TransformChain::new(vec![Box::new(Tag(0xa, "a")), Box::new(Tag(0xb, "b"))]);
		let staged = chain.apply(vec![tx(1)]).unwrap();

		let a_then_b = Tag(0xb, "b")
			.transform(0, &Tag(0xa, "a").transform(0, &tx(1)).unwrap()[0])
			.unwrap();
		assert_eq!(staged[0].transaction, a_then_b[0]);
		assert_eq!(staged[0].transaction.data.as_ref(), &[1, 0xa, 0xb]);
		assert_eq!(chain.kinds(), vec!["a", "b"]);
	}

	#[test]
	fn test_empty_chain_is_identity() {
		let chain = TransformChain::default();
		let staged = chain.apply(vec![tx(1), tx(2)]).unwrap();
		assert!(chain.is_empty());
		assert_eq!(staged, StagedTransaction::from_batch(vec![tx(1), tx(2)]));
	}

	#[test]
	fn test_expansion_keeps_source_index() {
		let chain = TransformChain::new(vec![Box::new(Split)]);
		let staged = chain.apply(vec![tx(1), tx(2)]).unwrap();

		let indices: Vec<usize> = staged.iter().map(|s| s.source_index).collect();
		assert_eq!(indices, vec![0, 0, 1, 1]);
	}

	#[test]
	fn test_positions_are_unique_within_a_stage() {
		let chain = TransformChain::new(vec![Box::new(Split), Box::new(Position)]);
		let staged = chain.apply(vec![tx(1), tx(1)]).unwrap();

		let positions: Vec<u8> = staged.iter().map(|s| s.transaction.data[0]).collect();
		assert_eq!(positions, vec![0, 1, 2, 3]);
	}

	#[test]
	fn test_failure_names_stage_and_input() {
		let chain = TransformChain::new(vec![Box::new(Split), Box::new(Refuse)]);
		let err = chain.apply(vec![tx(1)]).unwrap_err();
		assert!(matches!(
			err,
			TransformError::Stage {
				kind: "refuse",
				index: 0,
				..
			}
		));
	}

	#[test]
	fn test_registered_transformers() {
		let kinds: Vec<&str> = get_all_implementations().iter().map(|r| r.kind).collect();
		assert_eq!(kinds, vec!["interchain-account", "timelock"]);
		assert!(get_all_implementations()
			.iter()
			.all(|r| r.supports(ProtocolType::Ethereum) && !r.supports(ProtocolType::Sealevel)));
	}
}
