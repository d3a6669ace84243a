//! `submit keys` subcommand: key lifecycle against the configured backend.

use clap::ValueEnum;
use std::str::FromStr;
use submit_account::{create_key_backend, AccountError, KeyAddress, KeyIdentity, KeyRole, ManagedKey};
use submit_config::Config;

/// Implementation name whose table names the key backend.
const MANAGED_ACCOUNT: &str = "managed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyAction {
	/// Generate a new key, replacing any stored one.
	Create,
	/// Replace the stored key with a fresh one.
	Rotate,
	/// Delete the stored key.
	Delete,
	/// Print the address of the stored key.
	Address,
}

/// One key operation.
#[derive(Debug, Clone)]
pub struct KeyCommand {
	pub action: KeyAction,
	pub role: String,
	pub chain: Option<String>,
	pub index: Option<u32>,
}

/// Runs a key operation, returning the resulting address unless the key was deleted.
pub async fn run_key_command(
	config: &Config,
	command: &KeyCommand,
) -> Result<Option<KeyAddress>, AccountError> {
	let backend_config = config
		.account
		.implementations
		.get(MANAGED_ACCOUNT)
		.ok_or_else(|| {
			AccountError::InvalidConfig(format!(
				"key commands need [account.implementations.{}] with a key backend",
				MANAGED_ACCOUNT
			))
		})?;
	let backend = create_key_backend(backend_config)?;

	let identity = KeyIdentity::from_parts(
		&config.service.environment,
		KeyRole::from_str(&command.role)?,
		command.chain.clone(),
		command.index,
	)?;
	let mut key = ManagedKey::new(identity, backend);

	match command.action {
		KeyAction::Create => key.create().await?,
		KeyAction::Rotate => {
			key.rotate().await?;
		},
		KeyAction::Delete => {
			key.delete().await?;
			return Ok(None);
		},
		KeyAction::Address => key.fetch().await?,
	}

	let address = key.serialize_as_address()?;
	tracing::info!(
		key = %address.identifier,
		address = %address.address,
		action = ?command.action,
		"Key ready"
	);
	Ok(Some(address))
}
