//! Delivery module for the transaction submission system.
//!
//! This crate owns everything that touches a chain: the [`ChainProvider`]
//! seam over an RPC endpoint, the bounded retry policy for transient
//! failures, and the [`SubmitterInterface`] variants that turn staged
//! transactions into receipts. A submitter is always bound to one
//! [`ChainRuntime`], the provider and account resolved for its chain.

use alloy_primitives::Bytes;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use submit_account::{AccountError, AccountService};
use submit_types::{
	ChainMetadata, ConfigSchema, ImplementationRegistry, MultisigConfig, ProtocolType, Receipt,
	SecretString, StagedTransaction, TransactionHash, TransactionReceipt, TransactionValue,
};
use thiserror::Error;

mod dispatch;
pub mod proposal;
pub mod retry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use proposal::{ProposalService, SafeProposal, SafeTransactionService};
pub use retry::{RetryFailure, RetryPolicy};

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}

	pub mod submitters {
		pub mod batch_executor;
		pub mod direct;
		pub mod multisig_proposal;
	}
}

/// Errors reported by a chain provider or proposal service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
	/// Network hiccup, rate limit or unavailable endpoint. Safe to retry.
	#[error("Transient provider failure: {0}")]
	Transient(String),
	/// The transaction did not reach the required confirmations in time.
	#[error("Timed out: {0}")]
	Timeout(String),
	/// The node or service refused the request.
	#[error("Rejected: {0}")]
	Rejected(String),
	/// The transaction cannot be expressed for this chain.
	#[error("Invalid transaction: {0}")]
	InvalidTransaction(String),
}

impl ProviderError {
	/// Returns true for failures worth retrying.
	pub fn is_transient(&self) -> bool {
		matches!(self, ProviderError::Transient(_) | ProviderError::Timeout(_))
	}
}

/// A signed transaction ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	pub hash: TransactionHash,
	pub raw: Bytes,
}

/// Trait defining the interface to one chain's RPC endpoint.
///
/// Implementations sign with the account they were built for; callers only
/// hand over protocol-neutral transaction values.
#[async_trait]
pub trait ChainProvider: Send + Sync {
	/// Protocol family of the chain.
	fn protocol(&self) -> ProtocolType;

	/// Native chain id.
	fn chain_id(&self) -> u64;

	/// Address transactions are sent from.
	fn signer_address(&self) -> String;

	/// Checks protocol-specific fields without touching the network.
	fn validate_transaction(&self, tx: &TransactionValue) -> Result<(), ProviderError>;

	/// Fills and signs a transaction without broadcasting it.
	///
	/// The nonce is fixed here, so every broadcast of the result is the
	/// same transaction.
	async fn sign_transaction(
		&self,
		tx: &TransactionValue,
	) -> Result<SignedTransaction, ProviderError>;

	/// Broadcasts a signed transaction, returning its hash.
	///
	/// Rebroadcasting a transaction the node already knows succeeds with
	/// the same hash.
	async fn broadcast(&self, signed: &SignedTransaction) -> Result<TransactionHash, ProviderError>;

	/// Waits until the transaction has `confirmations` blocks, or fails
	/// with [`ProviderError::Timeout`].
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
		timeout: Duration,
	) -> Result<TransactionReceipt, ProviderError>;

	/// Simulates a transaction and returns its gas estimate. Never broadcasts.
	async fn estimate_gas(&self, tx: &TransactionValue) -> Result<u64, ProviderError>;
}

/// Type alias for chain provider factory functions.
pub type ChainProviderFactory =
	fn(&ChainMetadata, &SecretString) -> Result<Box<dyn ChainProvider>, ProviderError>;

/// Registry trait for chain provider implementations, keyed by protocol name.
pub trait ChainProviderRegistry: ImplementationRegistry<Factory = ChainProviderFactory> {}

/// Get all registered chain provider implementations.
pub fn get_all_chain_providers() -> Vec<(&'static str, ChainProviderFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Confirmation and retry settings applied to every dispatch.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
	pub min_confirmations: u64,
	pub confirmation_timeout: Duration,
	pub retry: RetryPolicy,
}

impl Default for DispatchPolicy {
	fn default() -> Self {
		Self {
			min_confirmations: 1,
			confirmation_timeout: Duration::from_secs(120),
			retry: RetryPolicy::default(),
		}
	}
}

/// Everything a submitter needs to act on one chain.
pub struct ChainRuntime {
	/// Chain name as used in strategies and transactions.
	pub name: String,
	pub metadata: ChainMetadata,
	pub provider: Arc<dyn ChainProvider>,
	pub account: Arc<AccountService>,
	/// Proposal service for multisig submitters, when the chain has one.
	pub proposals: Option<Arc<dyn ProposalService>>,
	/// Security-module validator set of the chain, when configured.
	pub multisig: Option<MultisigConfig>,
	pub policy: DispatchPolicy,
}

impl ChainRuntime {
	pub fn protocol(&self) -> ProtocolType {
		self.metadata.protocol
	}
}

impl fmt::Debug for ChainRuntime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChainRuntime")
			.field("name", &self.name)
			.field("metadata", &self.metadata)
			.field("signer", &self.provider.signer_address())
			.field("proposals", &self.proposals.is_some())
			.field("multisig", &self.multisig)
			.field("policy", &self.policy)
			.finish_non_exhaustive()
	}
}

/// Whether a submitter dispatches or only simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
	Live,
	DryRun,
}

impl SubmitMode {
	pub fn from_dry_run(dry_run: bool) -> Self {
		if dry_run {
			SubmitMode::DryRun
		} else {
			SubmitMode::Live
		}
	}

	pub fn is_dry_run(&self) -> bool {
		matches!(self, SubmitMode::DryRun)
	}
}

/// Errors that can occur while submitting a batch.
#[derive(Debug, Error)]
pub enum SubmitterError {
	/// The submitter parameters were rejected.
	#[error("Invalid submitter configuration: {0}")]
	InvalidConfig(String),
	/// A transaction failed validation. Nothing was dispatched.
	#[error("Transaction {index} is invalid: {reason}")]
	InvalidTransaction { index: usize, reason: String },
	/// A transient failure persisted through every retry.
	///
	/// `pending` is the hash of a broadcast that may still land.
	#[error("Transaction {index} failed after {attempts} attempts: {cause}{}", in_flight(.pending))]
	TransientDispatchFailure {
		index: usize,
		attempts: u32,
		cause: ProviderError,
		pending: Option<TransactionHash>,
	},
	/// A non-retryable failure while dispatching a transaction.
	#[error("Transaction {index} was rejected: {cause}{}", in_flight(.pending))]
	Rejected {
		index: usize,
		cause: ProviderError,
		pending: Option<TransactionHash>,
	},
	/// The transaction was mined but reverted.
	#[error("Transaction {index} reverted in {hash}")]
	Reverted { index: usize, hash: TransactionHash },
	/// Simulation of a transaction failed during a dry run.
	#[error("Simulation of transaction {index} failed: {cause}")]
	Simulation { index: usize, cause: ProviderError },
	/// Transactions before `failed_index` landed; the rest were not attempted.
	#[error(
		"Batch failed at transaction {failed_index} after {} confirmed: {cause}",
		succeeded.len()
	)]
	PartialBatchFailure {
		failed_index: usize,
		cause: Box<SubmitterError>,
		succeeded: Vec<Receipt>,
	},
	/// The single coupled dispatch of a batch failed.
	///
	/// Nothing was confirmed, but when `pending` is set the batch call was
	/// broadcast and may still land.
	#[error("Batch of {batch_size} transactions failed: {cause}")]
	BatchDispatchFailure {
		batch_size: usize,
		cause: Box<SubmitterError>,
		pending: Option<TransactionHash>,
	},
	#[error("Account error: {0}")]
	Account(#[from] AccountError),
}

impl SubmitterError {
	/// Receipts for transactions that were confirmed before the failure.
	pub fn confirmed_receipts(&self) -> &[Receipt] {
		match self {
			SubmitterError::PartialBatchFailure { succeeded, .. } => succeeded,
			_ => &[],
		}
	}

	/// Hash of a broadcast whose outcome is unknown, if the failure left one.
	///
	/// Check it on chain before resubmitting.
	pub fn pending_hash(&self) -> Option<&TransactionHash> {
		match self {
			SubmitterError::TransientDispatchFailure { pending, .. }
			| SubmitterError::Rejected { pending, .. }
			| SubmitterError::BatchDispatchFailure { pending, .. } => pending.as_ref(),
			SubmitterError::PartialBatchFailure { cause, .. } => cause.pending_hash(),
			_ => None,
		}
	}
}

fn in_flight(pending: &Option<TransactionHash>) -> String {
	match pending {
		Some(hash) => format!(" ({} may still land)", hash),
		None => String::new(),
	}
}

/// Trait defining the interface for submitter implementations.
///
/// A submitter is bound to one chain runtime and one [`SubmitMode`] when it
/// is built; `submit` dispatches a whole staged batch and returns one
/// receipt per staged transaction, in order.
#[async_trait]
pub trait SubmitterInterface: Send + Sync {
	/// The strategy kind tag this submitter was built for.
	fn kind(&self) -> &'static str;

	/// Returns the configuration schema for the submitter parameters.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Submits a batch of staged transactions.
	async fn submit(&self, transactions: Vec<StagedTransaction>)
		-> Result<Vec<Receipt>, SubmitterError>;
}

/// Type alias for submitter factory functions.
pub type SubmitterFactory = fn(
	&toml::Value,
	Arc<ChainRuntime>,
	SubmitMode,
) -> Result<Box<dyn SubmitterInterface>, SubmitterError>;

/// Registry trait for submitter implementations.
pub trait SubmitterRegistry: ImplementationRegistry<Factory = SubmitterFactory> {
	/// Protocol families the submitter can be bound to.
	const PROTOCOLS: &'static [ProtocolType];
}

/// A registered submitter kind.
#[derive(Clone, Copy)]
pub struct SubmitterRegistration {
	pub kind: &'static str,
	pub protocols: &'static [ProtocolType],
	pub factory: SubmitterFactory,
}

impl SubmitterRegistration {
	fn of<R: SubmitterRegistry>() -> Self {
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

/// Get all registered submitter implementations.
pub fn get_all_implementations() -> Vec<SubmitterRegistration> {
	use implementations::submitters::{batch_executor, direct, multisig_proposal};

	vec![
		SubmitterRegistration::of::<direct::Registry>(),
		SubmitterRegistration::of::<multisig_proposal::Registry>(),
		SubmitterRegistration::of::<batch_executor::Registry>(),
	]
}
