//! Dispatch steps shared by the submitter implementations.

use crate::{ChainRuntime, RetryFailure, SubmitterError};
use alloy_primitives::Address;
use std::str::FromStr;
use submit_types::{StagedTransaction, TransactionHash, TransactionReceipt, TransactionValue};
use tracing::{info, warn};

/// Checks a staged transaction targets the runtime's chain.
pub(crate) fn check_chain(
	runtime: &ChainRuntime,
	staged: &StagedTransaction,
) -> Result<(), SubmitterError> {
	if staged.transaction.chain != runtime.name {
		return Err(SubmitterError::InvalidTransaction {
			index: staged.source_index,
			reason: format!(
				"targets chain '{}' but the submitter is bound to '{}'",
				staged.transaction.chain, runtime.name
			),
		});
	}
	Ok(())
}

/// Parses an EVM address field of a staged transaction.
pub(crate) fn evm_address(index: usize, field: &str, value: &str) -> Result<Address, SubmitterError> {
	Address::from_str(value).map_err(|e| SubmitterError::InvalidTransaction {
		index,
		reason: format!("{} is not an EVM address: {}", field, e),
	})
}

/// Maps an exhausted retry to a dispatch error. `pending` is the hash of a
/// broadcast the failure left in flight.
pub(crate) fn retry_error(
	index: usize,
	failure: RetryFailure,
	pending: Option<TransactionHash>,
) -> SubmitterError {
	if failure.cause.is_transient() {
		SubmitterError::TransientDispatchFailure {
			index,
			attempts: failure.attempts,
			cause: failure.cause,
			pending,
		}
	} else {
		SubmitterError::Rejected {
			index,
			cause: failure.cause,
			pending,
		}
	}
}

/// Broadcasts one transaction and waits for its confirmations.
///
/// The transaction is signed once, so retried broadcasts resend identical
/// bytes and can land at most once. A confirmation timeout waits again on
/// the same hash and never rebroadcasts.
pub(crate) async fn send_and_confirm(
	runtime: &ChainRuntime,
	index: usize,
	tx: &TransactionValue,
) -> Result<TransactionReceipt, SubmitterError> {
	let provider = runtime.provider.as_ref();
	let policy = &runtime.policy;

	let signed = policy
		.retry
		.run(move || provider.sign_transaction(tx))
		.await
		.map_err(|failure| retry_error(index, failure, None))?;

	let signed_ref = &signed;
	let hash = policy
		.retry
		.run(move || provider.broadcast(signed_ref))
		.await
		.map_err(|failure| {
			// A lost acknowledgement may still have reached the mempool.
			let pending = failure.cause.is_transient().then(|| signed.hash.clone());
			retry_error(index, failure, pending)
		})?;

	info!(chain = %runtime.name, index, tx_hash = %hash, "Submitted transaction");

	let hash_ref = &hash;
	let receipt = policy
		.retry
		.run(move || {
			provider.wait_for_confirmation(
				hash_ref,
				policy.min_confirmations,
				policy.confirmation_timeout,
			)
		})
		.await
		.map_err(|failure| {
			warn!(chain = %runtime.name, index, tx_hash = %hash, "Broadcast transaction is unconfirmed");
			retry_error(index, failure, Some(hash.clone()))
		})?;

	if !receipt.success {
		return Err(SubmitterError::Reverted {
			index,
			hash: receipt.hash,
		});
	}

	info!(
		chain = %runtime.name,
		index,
		tx_hash = %receipt.hash,
		block = receipt.block_number,
		"Transaction confirmed"
	);
	Ok(receipt)
}

/// Simulates one transaction, retrying transient failures.
pub(crate) async fn simulate(
	runtime: &ChainRuntime,
	index: usize,
	tx: &TransactionValue,
) -> Result<u64, SubmitterError> {
	let provider = runtime.provider.as_ref();
	runtime
		.policy
		.retry
		.run(move || provider.estimate_gas(tx))
		.await
		.map_err(|failure| SubmitterError::Simulation {
			index,
			cause: failure.cause,
		})
}
