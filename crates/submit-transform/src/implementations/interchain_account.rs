//! Interchain account transformer.
//!
//! Turns a call meant for a remote chain into a `callRemote` on the local
//! interchain account router. The router relays the call over the messaging
//! layer and executes it from the sender's account on the destination.
//! Input transactions name the destination chain; outputs are on the local
//! chain.

use crate::{
	TransformContext, TransformError, TransformerFactory, TransformerInterface,
	TransformerRegistry,
};
use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use std::str::FromStr;
use submit_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, ProtocolType, Schema,
	TransactionValue, ValidationError,
};

pub const KIND: &str = "interchain-account";

sol! {
	function callRemote(uint32 destination, address to, uint256 value, bytes data) external payable returns (bytes32);
}

/// Wraps each call into a `callRemote` on the router.
pub struct InterchainAccountTransformer {
	chain: String,
	destination_chain: String,
	router: Address,
	destination_domain: u32,
	gas_payment: U256,
}

impl TransformerInterface for InterchainAccountTransformer {
	fn kind(&self) -> &'static str {
		KIND
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(InterchainAccountSchema)
	}

	fn transform(
		&self,
		_position: usize,
		tx: &TransactionValue,
	) -> Result<Vec<TransactionValue>, TransformError> {
		if tx.chain != self.destination_chain {
			return Err(TransformError::Rejected(format!(
				"targets chain '{}' but the interchain account relays to '{}'",
				tx.chain, self.destination_chain
			)));
		}
		let to = Address::from_str(&tx.to)
			.map_err(|e| TransformError::Rejected(format!("to is not an EVM address: {}", e)))?;

		let data = callRemoteCall {
			destination: self.destination_domain,
			to,
			value: tx.value,
			data: tx.data.clone(),
		}
		.abi_encode();

		Ok(vec![TransactionValue::new(
			self.chain.clone(),
			self.router.to_checksum(None),
			data,
		)
		.with_value(self.gas_payment)])
	}
}

/// Configuration schema for the interchain account transformer.
pub struct InterchainAccountSchema;

impl ConfigSchema for InterchainAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("router", FieldType::Address),
				Field::new("destination_chain", FieldType::String),
				Field::new(
					"destination_domain",
					FieldType::Integer {
						min: Some(0),
						max: Some(u32::MAX as i64),
					},
				),
			],
			vec![Field::new(
				"gas_payment",
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)],
		)
		.strict()
		.validate(config)
	}
}

/// Factory function to create an interchain account transformer.
///
/// Configuration parameters:
/// - `router`: interchain account router on the strategy's chain
/// - `destination_chain`: chain the calls execute on, as named by the input
///   transactions
/// - `destination_domain`: messaging domain of that chain
/// - `gas_payment`: wei sent with each `callRemote` for relaying (default: 0)
pub fn create_transformer(
	config: &toml::Value,
	context: &TransformContext,
) -> Result<Box<dyn TransformerInterface>, TransformError> {
	InterchainAccountSchema
		.validate(config)
		.map_err(|e| TransformError::InvalidConfig(e.to_string()))?;

	let router = config
		.get("router")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TransformError::InvalidConfig("router is required".into()))
		.and_then(|router| {
			Address::from_str(router)
				.map_err(|e| TransformError::InvalidConfig(format!("Invalid router: {}", e)))
		})?;

	let destination_chain = config
		.get("destination_chain")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TransformError::InvalidConfig("destination_chain is required".into()))?;
	if destination_chain == context.chain {
		return Err(TransformError::InvalidConfig(format!(
			"destination_chain '{}' is the strategy's own chain",
			destination_chain
		)));
	}

	let destination_domain = config
		.get("destination_domain")
		.and_then(|v| v.as_integer())
		.and_then(|domain| u32::try_from(domain).ok())
		.ok_or_else(|| TransformError::InvalidConfig("destination_domain is required".into()))?;

	if Some(destination_domain) == context.metadata.domain() {
		return Err(TransformError::InvalidConfig(format!(
			"destination_domain {} is the domain of chain '{}' itself",
			destination_domain, context.chain
		)));
	}

	let gas_payment = config
		.get("gas_payment")
		.and_then(|v| v.as_integer())
		.map(|wei| U256::from(wei as u64))
		.unwrap_or(U256::ZERO);

	Ok(Box::new(InterchainAccountTransformer {
		chain: context.chain.clone(),
		destination_chain: destination_chain.to_string(),
		router,
		destination_domain,
		gas_payment,
	}))
}

/// Registry for the interchain account transformer.
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

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::Bytes;
	use submit_types::ChainMetadata;

	const ROUTER: &str = "0x9A676e781A523b5d0C0e43731313A708CB607508";
	const TARGET: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

	fn context() -> TransformContext {
		TransformContext {
			chain: "test1".into(),
			metadata: ChainMetadata {
				protocol: ProtocolType::Ethereum,
				chain_id: 31337,
				domain_id: None,
				rpc_url: "http://localhost:8545".into(),
				safe: None,
				safe_service_url: None,
			},
		}
	}

	fn params(toml: &str) -> toml::Value {
		toml::Value::Table(toml.parse().unwrap())
	}

	#[test]
	fn test_wraps_call_for_router() {
		let transformer = create_transformer(
			&params(&format!(
				"router = \"{}\"\ndestination_chain = \"test2\"\ndestination_domain = 31338\ngas_payment = 100",
				ROUTER
			)),
			&context(),
		)
		.unwrap();

		let tx = TransactionValue::new("test2", TARGET, Bytes::from(vec![0xca, 0xfe]))
			.with_value(U256::from(5));
		let out = transformer.transform(0, &tx).unwrap();

		assert_eq!(out.len(), 1);
		assert_eq!(out[0].chain, "test1");
		assert_eq!(out[0].to.to_lowercase(), ROUTER.to_lowercase());
		assert_eq!(out[0].value, U256::from(100));

		let call = callRemoteCall::abi_decode(&out[0].data, true).unwrap();
		assert_eq!(call.destination, 31338);
		assert_eq!(call.to, Address::from_str(TARGET).unwrap());
		assert_eq!(call.value, U256::from(5));
		assert_eq!(call.data, Bytes::from(vec![0xca, 0xfe]));
	}

	#[test]
	fn test_rejects_local_destination_and_missing_router() {
		assert!(matches!(
			create_transformer(
				&params(&format!(
					"router = \"{}\"\ndestination_chain = \"test2\"\ndestination_domain = 31337",
					ROUTER
				)),
				&context()
			),
			Err(TransformError::InvalidConfig(_))
		));
		assert!(matches!(
			create_transformer(
				&params(&format!(
					"router = \"{}\"\ndestination_chain = \"test1\"\ndestination_domain = 2",
					ROUTER
				)),
				&context()
			),
			Err(TransformError::InvalidConfig(_))
		));
		assert!(create_transformer(
			&params("destination_chain = \"test2\"\ndestination_domain = 2"),
			&context()
		)
		.is_err());
	}

	fn remote_transformer() -> Box<dyn TransformerInterface> {
		create_transformer(
			&params(&format!(
				"router = \"{}\"\ndestination_chain = \"test2\"\ndestination_domain = 2",
				ROUTER
			)),
			&context(),
		)
		.unwrap()
	}

	#[test]
	fn test_rejects_non_evm_destination() {
		let tx = TransactionValue::new("test2", "cosmos1xyz", Bytes::new());
		assert!(matches!(
			remote_transformer().transform(0, &tx),
			Err(TransformError::Rejected(_))
		));
	}

	#[test]
	fn test_rejects_call_for_another_chain() {
		let transformer = remote_transformer();
		for chain in ["test1", "test3"] {
			let tx = TransactionValue::new(chain, TARGET, Bytes::from(vec![0x01]));
			assert!(matches!(
				transformer.transform(0, &tx),
				Err(TransformError::Rejected(reason)) if reason.contains(chain)
			));
		}
	}
}
