//! Timelock transformer.
//!
//! Routes each call through a timelock controller: the call is scheduled
//! first and executed by a second transaction. With a non-zero `delay` the
//! execute transaction only succeeds once the delay has passed, so such
//! batches are normally submitted through a proposal submitter.
//!
//! Operation salts are derived from the configured salt and the call's
//! position in the batch, so identical calls get distinct operation ids.

use crate::{
	TransformContext, TransformError, TransformerFactory, TransformerInterface,
	TransformerRegistry,
};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{sol, SolCall};
use std::str::FromStr;
use submit_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, ProtocolType, Schema,
	TransactionValue, ValidationError,
};

pub const KIND: &str = "timelock";

sol! {
	function schedule(address target, uint256 value, bytes data, bytes32 predecessor, bytes32 salt, uint256 delay) external;
	function execute(address target, uint256 value, bytes payload, bytes32 predecessor, bytes32 salt) external payable;
}

/// Expands each call into `schedule` followed by `execute`.
pub struct TimelockTransformer {
	chain: String,
	timelock: Address,
	delay: U256,
	salt: B256,
}

impl TimelockTransformer {
	fn operation_salt(&self, position: usize) -> B256 {
		let mut preimage = self.salt.to_vec();
		preimage.extend_from_slice(&U256::from(position).to_be_bytes::<32>());
		keccak256(preimage)
	}
}

impl TransformerInterface for TimelockTransformer {
	fn kind(&self) -> &'static str {
		KIND
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(TimelockSchema)
	}

	fn transform(
		&self,
		position: usize,
		tx: &TransactionValue,
	) -> Result<Vec<TransactionValue>, TransformError> {
		if tx.chain != self.chain {
			return Err(TransformError::Rejected(format!(
				"targets chain '{}' but the timelock is on '{}'",
				tx.chain, self.chain
			)));
		}
		let target = Address::from_str(&tx.to)
			.map_err(|e| TransformError::Rejected(format!("to is not an EVM address: {}", e)))?;
		let timelock = self.timelock.to_checksum(None);
		let salt = self.operation_salt(position);

		let schedule = scheduleCall {
			target,
			value: tx.value,
			data: tx.data.clone(),
			predecessor: B256::ZERO,
			salt,
			delay: self.delay,
		}
		.abi_encode();

		let execute = executeCall {
			target,
			value: tx.value,
			payload: tx.data.clone(),
			predecessor: B256::ZERO,
			salt,
		}
		.abi_encode();

		Ok(vec![
			TransactionValue::new(self.chain.clone(), timelock.clone(), schedule),
			TransactionValue::new(self.chain.clone(), timelock, execute).with_value(tx.value),
		])
	}
}

/// Configuration schema for the timelock transformer.
pub struct TimelockSchema;

impl ConfigSchema for TimelockSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("timelock", FieldType::Address)],
			vec![
				Field::new(
					"delay",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new("salt", FieldType::String).with_validator(|value| {
					let salt = value.as_str().unwrap_or_default();
					B256::from_str(salt)
						.map(|_| ())
						.map_err(|_| "salt must be 32 bytes of hex".to_string())
				}),
			],
		)
		.strict()
		.validate(config)
	}
}

/// Factory function to create a timelock transformer.
///
/// Configuration parameters:
/// - `timelock`: timelock controller on the strategy's chain
/// - `delay`: seconds between schedule and execute (default: 0)
/// - `salt`: 32-byte base of the per-operation salts (default: zero)
pub fn create_transformer(
	config: &toml::Value,
	context: &TransformContext,
) -> Result<Box<dyn TransformerInterface>, TransformError> {
	TimelockSchema
		.validate(config)
		.map_err(|e| TransformError::InvalidConfig(e.to_string()))?;

	let timelock = config
		.get("timelock")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TransformError::InvalidConfig("timelock is required".into()))
		.and_then(|timelock| {
			Address::from_str(timelock)
				.map_err(|e| TransformError::InvalidConfig(format!("Invalid timelock: {}", e)))
		})?;

	let delay = config
		.get("delay")
		.and_then(|v| v.as_integer())
		.map(|secs| U256::from(secs as u64))
		.unwrap_or(U256::ZERO);

	let salt = match config.get("salt").and_then(|v| v.as_str()) {
		Some(salt) => B256::from_str(salt)
			.map_err(|e| TransformError::InvalidConfig(format!("Invalid salt: {}", e)))?,
		None => B256::ZERO,
	};

	Ok(Box::new(TimelockTransformer {
		chain: context.chain.clone(),
		timelock,
		delay,
		salt,
	}))
}

/// Registry for the timelock transformer.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = KIND;
	type Factory = TransformerFactory;

	fn factory() -> Self::Factory {
		create_transformer
	}
}

impl TransformerRegistry for Registry {
	const PROTOCOLS: &'static [ProtocolType] = &[ProtocolType::Ethereum];
}
