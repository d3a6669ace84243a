//! Common types module for the transaction submission system.
//!
//! This crate defines the data types shared by every stage of a submission
//! run: the protocol-neutral transaction value, submission strategy documents,
//! chain metadata, receipts and the configuration validation framework.

/// Chain metadata and protocol families.
pub mod chains;
/// Transaction hashes, chain confirmations and submission receipts.
pub mod delivery;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secure string type for private key material.
pub mod secret_string;
/// Security-module (multisig validator set) configuration.
pub mod security;
/// Storage namespaces.
pub mod storage;
/// Submission strategy documents.
pub mod strategy;
/// Protocol-neutral transaction values.
pub mod transaction;
/// Formatting and time helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use chains::{ChainMetadata, ChainsConfig, ProtocolType};
pub use delivery::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use security::{MultisigConfig, SecurityModuleConfig};
pub use storage::StorageKey;
pub use strategy::*;
pub use transaction::*;
pub use utils::{current_timestamp, truncate_id, with_0x_prefix, without_0x_prefix};
pub use validation::*;
