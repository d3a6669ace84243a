//! Scripted in-memory fakes for exercising submitters without a chain.
//!
//! Every call is recorded so tests can assert on exactly what would have
//! reached the network.

use crate::{
	ChainProvider, ChainRuntime, DispatchPolicy, ProposalService, ProviderError, RetryPolicy,
	SafeProposal, SignedTransaction,
};
use alloy_primitives::{keccak256, Address};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use submit_account::implementations::local::LocalAccount;
use submit_account::AccountService;
use submit_types::{
	ChainMetadata, MultisigConfig, ProtocolType, SecretString, TransactionHash,
	TransactionReceipt, TransactionValue,
};

/// Anvil's first dev account.
pub const DEV_PRIVATE_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Safe address set on chains built by [`runtime`].
pub const TEST_SAFE: &str = "0x0000000000000000000000000000000000005afe";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum SendOutcome {
	Reply(Result<(), ProviderError>),
	/// The transaction lands but the reply is lost.
	LostReply(ProviderError),
}

#[derive(Default)]
struct ProviderState {
	send_script: VecDeque<SendOutcome>,
	confirm_script: VecDeque<Result<bool, ProviderError>>,
	send_attempts: usize,
	signed: HashMap<TransactionHash, TransactionValue>,
	landed: HashSet<TransactionHash>,
	broadcasts: Vec<TransactionValue>,
	simulations: Vec<TransactionValue>,
}

impl ProviderState {
	fn land(&mut self, hash: &TransactionHash) {
		if !self.landed.insert(hash.clone()) {
			return;
		}
		if let Some(tx) = self.signed.get(hash) {
			self.broadcasts.push(tx.clone());
		}
	}
}

/// A chain provider whose outcomes are scripted per call.
///
/// Unscripted sends succeed and unscripted confirmations report success.
/// A signed transaction lands at most once however often it is broadcast.
pub struct FakeChainProvider {
	protocol: ProtocolType,
	chain_id: u64,
	gas_estimate: u64,
	state: Mutex<ProviderState>,
}

impl FakeChainProvider {
	pub fn new(chain_id: u64) -> Self {
		Self {
			protocol: ProtocolType::Ethereum,
			chain_id,
			gas_estimate: 21_000,
			state: Mutex::new(ProviderState::default()),
		}
	}

	pub fn with_protocol(mut self, protocol: ProtocolType) -> Self {
		self.protocol = protocol;
		self
	}

	/// Queues outcomes for the next broadcast calls, retries included.
	pub fn script_sends(&self, outcomes: impl IntoIterator<Item = Result<(), ProviderError>>) {
		lock(&self.state)
			.send_script
			.extend(outcomes.into_iter().map(SendOutcome::Reply));
	}

	/// Queues a broadcast that lands on chain but answers with `error`.
	pub fn script_lost_reply(&self, error: ProviderError) {
		lock(&self.state)
			.send_script
			.push_back(SendOutcome::LostReply(error));
	}

	/// Queues outcomes for the next confirmation waits. `Ok(false)` is a revert.
	pub fn script_confirmations(
		&self,
		outcomes: impl IntoIterator<Item = Result<bool, ProviderError>>,
	) {
		lock(&self.state).confirm_script.extend(outcomes);
	}

	/// Transactions that landed on chain, in order.
	pub fn broadcasts(&self) -> Vec<TransactionValue> {
		lock(&self.state).broadcasts.clone()
	}

	/// Number of broadcast calls, failed ones included.
	pub fn send_attempts(&self) -> usize {
		lock(&self.state).send_attempts
	}

	/// Transactions that were simulated, in order.
	pub fn simulations(&self) -> Vec<TransactionValue> {
		lock(&self.state).simulations.clone()
	}
}

fn fake_hash(chain_id: u64, sequence: usize) -> TransactionHash {
	TransactionHash(keccak256(format!("{}:{}", chain_id, sequence)).to_vec())
}

#[async_trait]
impl ChainProvider for FakeChainProvider {
	fn protocol(&self) -> ProtocolType {
		self.protocol
	}

	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	fn signer_address(&self) -> String {
		"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string()
	}

	fn validate_transaction(&self, tx: &TransactionValue) -> Result<(), ProviderError> {
		if self.protocol == ProtocolType::Ethereum {
			Address::from_str(&tx.to).map_err(|e| {
				ProviderError::InvalidTransaction(format!("Invalid to address: {}", e))
			})?;
		}
		Ok(())
	}

	async fn sign_transaction(
		&self,
		tx: &TransactionValue,
	) -> Result<SignedTransaction, ProviderError> {
		let mut state = lock(&self.state);
		let hash = fake_hash(self.chain_id, state.signed.len() + 1);
		state.signed.insert(hash.clone(), tx.clone());
		Ok(SignedTransaction {
			hash,
			raw: tx.data.clone(),
		})
	}

	async fn broadcast(&self, signed: &SignedTransaction) -> Result<TransactionHash, ProviderError> {
		let mut state = lock(&self.state);
		state.send_attempts += 1;
		match state.send_script.pop_front() {
			Some(SendOutcome::Reply(Err(e))) => Err(e),
			Some(SendOutcome::LostReply(e)) => {
				state.land(&signed.hash);
				Err(e)
			},
			_ => {
				state.land(&signed.hash);
				Ok(signed.hash.clone())
			},
		}
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		_confirmations: u64,
		_timeout: Duration,
	) -> Result<TransactionReceipt, ProviderError> {
		let mut state = lock(&self.state);
		let success = match state.confirm_script.pop_front() {
			Some(outcome) => outcome?,
			None => true,
		};
		Ok(TransactionReceipt {
			hash: hash.clone(),
			block_number: 100 + state.broadcasts.len() as u64,
			success,
		})
	}

	async fn estimate_gas(&self, tx: &TransactionValue) -> Result<u64, ProviderError> {
		self.validate_transaction(tx)?;
		lock(&self.state).simulations.push(tx.clone());
		Ok(self.gas_estimate)
	}
}

#[derive(Default)]
struct ProposalState {
	onchain_nonce: u64,
	script: VecDeque<Result<(), ProviderError>>,
	proposals: Vec<SafeProposal>,
}

/// A proposal queue kept in memory.
///
/// Proposals are never executed, so the next nonce is the on-chain nonce
/// plus the number of queued proposals.
#[derive(Default)]
pub struct FakeProposalService {
	state: Mutex<ProposalState>,
}

impl FakeProposalService {
	/// A Safe at `onchain_nonce` with nothing queued.
	pub fn new(onchain_nonce: u64) -> Self {
		Self {
			state: Mutex::new(ProposalState {
				onchain_nonce,
				..ProposalState::default()
			}),
		}
	}

	/// Queues outcomes for the next `propose` calls, retries included.
	pub fn script_proposals(&self, outcomes: impl IntoIterator<Item = Result<(), ProviderError>>) {
		lock(&self.state).script.extend(outcomes);
	}

	pub fn proposals(&self) -> Vec<SafeProposal> {
		lock(&self.state).proposals.clone()
	}
}

#[async_trait]
impl ProposalService for FakeProposalService {
	async fn next_nonce(&self, _safe: Address) -> Result<u64, ProviderError> {
		let state = lock(&self.state);
		Ok(state.onchain_nonce + state.proposals.len() as u64)
	}

	async fn propose(&self, proposal: &SafeProposal) -> Result<(), ProviderError> {
		let mut state = lock(&self.state);
		if let Some(Err(e)) = state.script.pop_front() {
			return Err(e);
		}
		state.proposals.push(proposal.clone());
		Ok(())
	}
}

/// Builds a runtime for `chain` around a fake provider.
///
/// Retries are immediate (two retries), one confirmation is required and the
/// account is the anvil dev key.
pub fn runtime(chain: &str, provider: Arc<FakeChainProvider>) -> ChainRuntime {
	let account = LocalAccount::new(SecretString::from(DEV_PRIVATE_KEY))
		.map(|account| AccountService::new(Box::new(account)))
		.unwrap_or_else(|e| panic!("dev key must parse: {}", e));

	ChainRuntime {
		name: chain.to_string(),
		metadata: ChainMetadata {
			protocol: provider.protocol(),
			chain_id: provider.chain_id(),
			domain_id: None,
			rpc_url: "http://localhost:8545".to_string(),
			safe: Some(TEST_SAFE.to_string()),
			safe_service_url: None,
		},
		provider,
		account: Arc::new(account),
		proposals: None,
		multisig: None,
		policy: DispatchPolicy {
			min_confirmations: 1,
			confirmation_timeout: Duration::from_secs(1),
			retry: RetryPolicy {
				max_retries: 2,
				initial_delay: Duration::ZERO,
				max_delay: Duration::ZERO,
			},
		},
	}
}

/// Adds a proposal service and a validator set of `validators` owners.
pub fn with_multisig(
	mut runtime: ChainRuntime,
	proposals: Arc<FakeProposalService>,
	validators: usize,
	threshold: u32,
) -> ChainRuntime {
	runtime.proposals = Some(proposals);
	runtime.multisig = Some(MultisigConfig {
		validators: (1..=validators)
			.map(|i| format!("0x{:040x}", i))
			.collect(),
		threshold,
	});
	runtime
}
