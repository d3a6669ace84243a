//! Submission orchestrator.
//!
//! Drives one run end to end: checks the strategy is present, loads and
//! validates the whole batch before anything touches a chain, builds the
//! pipeline for the strategy's chain, submits the batch in a single call and
//! records the outcome. A failed run is reported once, with the number of
//! transactions attempted, the cause and any receipts that were already
//! confirmed. The orchestrator never resubmits.

use crate::builder::{BuilderError, PipelineError, SubmissionFactories, SubmitterBuilder};
use crate::registry::ChainRegistry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use submit_config::{load_transactions, write_document, Config, ConfigError};
use submit_storage::{StorageError, StorageService};
use submit_types::{
	current_timestamp, parse_batch, Receipt, StorageKey, SubmissionStrategy, TransactionHash,
	TransactionSchemaError,
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
	#[error("No submission strategy was supplied")]
	MissingStrategy,
	#[error("Invalid transaction input at {}: {}", format_indices(.errors), format_reasons(.errors))]
	InvalidTransactionInput { errors: Vec<TransactionSchemaError> },
	#[error("Failed to read or write a run document: {0}")]
	Document(#[from] ConfigError),
	#[error(transparent)]
	Build(#[from] BuilderError),
	#[error("Submission failed after attempting {attempted} transaction(s), {} confirmed: {cause}", .confirmed.len())]
	Failed {
		attempted: usize,
		cause: PipelineError,
		confirmed: Vec<Receipt>,
	},
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl OrchestratorError {
	/// Indices of the malformed batch entries, for `InvalidTransactionInput`.
	pub fn invalid_indices(&self) -> Vec<usize> {
		match self {
			OrchestratorError::InvalidTransactionInput { errors } => {
				errors.iter().map(|e| e.index).collect()
			},
			_ => Vec::new(),
		}
	}

	/// Receipts that landed before the run failed.
	pub fn confirmed_receipts(&self) -> &[Receipt] {
		match self {
			OrchestratorError::Failed { confirmed, .. } => confirmed,
			_ => &[],
		}
	}

	/// Hash of a broadcast that may still land, for `Failed`.
	pub fn pending_hash(&self) -> Option<&TransactionHash> {
		match self {
			OrchestratorError::Failed { cause, .. } => cause.pending_hash(),
			_ => None,
		}
	}
}

fn format_indices(errors: &[TransactionSchemaError]) -> String {
	let indices: Vec<String> = errors.iter().map(|e| e.index.to_string()).collect();
	format!("index {}", indices.join(", "))
}

fn format_reasons(errors: &[TransactionSchemaError]) -> String {
	errors
		.iter()
		.map(|e| e.to_string())
		.collect::<Vec<_>>()
		.join("; ")
}

/// Where the transaction batch comes from.
#[derive(Debug, Clone)]
pub enum BatchSource {
	/// A YAML or JSON batch document.
	File(PathBuf),
	/// Entries already decoded by the caller.
	Entries(Vec<serde_json::Value>),
}

impl BatchSource {
	async fn load(self) -> Result<Vec<serde_json::Value>, OrchestratorError> {
		match self {
			BatchSource::File(path) => Ok(load_transactions(path).await?),
			BatchSource::Entries(entries) => Ok(entries),
		}
	}
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
	/// Validate and simulate without broadcasting.
	pub dry_run: bool,
	/// Where to write the receipts document, if anywhere.
	pub receipts_path: Option<PathBuf>,
}

/// Record of one run, persisted under the `runs` namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
	pub run_id: String,
	pub chain: String,
	pub submitter: String,
	#[serde(default)]
	pub transforms: Vec<String>,
	pub dry_run: bool,
	/// Number of transactions in the input batch.
	pub attempted: usize,
	pub started_at: u64,
	pub finished_at: u64,
	/// Receipts in input order. On failure, only the confirmed ones.
	pub receipts: Vec<Receipt>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure: Option<String>,
	/// Broadcast left unconfirmed by the failure. Check it before resubmitting.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pending: Option<String>,
}

/// Entry of the receipt index, keyed by transaction hash or proposal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptIndexEntry {
	pub run_id: String,
	pub transaction_index: usize,
}

/// Caller-facing driver for submission runs.
pub struct Orchestrator {
	chains: Arc<ChainRegistry>,
	builder: SubmitterBuilder,
	storage: Arc<StorageService>,
}

impl Orchestrator {
	pub fn new(
		chains: Arc<ChainRegistry>,
		builder: SubmitterBuilder,
		storage: Arc<StorageService>,
	) -> Self {
		Self {
			chains,
			builder,
			storage,
		}
	}

	/// Wires storage, chain resolution and the pipeline builder from config.
	pub fn from_config(
		config: Config,
		factories: SubmissionFactories,
	) -> Result<Self, BuilderError> {
		let primary = config.storage.primary.as_str();
		let storage_config = config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Primary storage '{}' is not configured", primary))
		})?;
		let storage_factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Unknown storage implementation '{}'", primary))
		})?;
		let storage = match storage_factory(storage_config) {
			Ok(backend) => {
				tracing::info!(component = "storage", implementation = %primary, "Loaded");
				Arc::new(StorageService::new(backend))
			},
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				return Err(e.into());
			},
		};

		let builder = SubmitterBuilder::new(&factories);
		let chains = Arc::new(ChainRegistry::new(config, &factories));
		Ok(Self::new(chains, builder, storage))
	}

	pub fn chains(&self) -> &ChainRegistry {
		&self.chains
	}

	pub fn storage(&self) -> &StorageService {
		&self.storage
	}

	/// Runs one batch under `strategy`.
	///
	/// Returns the run report on success. An empty batch, live or dry, is a
	/// successful run with zero receipts.
	#[instrument(skip_all, fields(dry_run = options.dry_run))]
	pub async fn run(
		&self,
		strategy: Option<&SubmissionStrategy>,
		source: BatchSource,
		options: &RunOptions,
	) -> Result<RunReport, OrchestratorError> {
		let strategy = strategy.ok_or(OrchestratorError::MissingStrategy)?;
		let started_at = current_timestamp();

		let entries = source.load().await?;
		let transactions = parse_batch(&entries).map_err(|errors| {
			error!(
				invalid = ?errors.iter().map(|e| e.index).collect::<Vec<_>>(),
				"Rejected transaction batch"
			);
			OrchestratorError::InvalidTransactionInput { errors }
		})?;

		let metadata = self.chains.metadata(&strategy.chain).await?;
		self.builder.check(strategy, &metadata)?;
		let runtime = self.chains.resolve(&strategy.chain).await?;
		let pipeline = self.builder.build(strategy, runtime, options.dry_run)?;

		let run_id = Uuid::new_v4().to_string();
		let attempted = transactions.len();
		info!(
			run_id = %run_id,
			chain = %strategy.chain,
			submitter = pipeline.submitter_kind(),
			count = attempted,
			"Submitting batch"
		);

		let mut report = RunReport {
			run_id,
			chain: strategy.chain.clone(),
			submitter: pipeline.submitter_kind().to_string(),
			transforms: pipeline
				.transformer_kinds()
				.into_iter()
				.map(String::from)
				.collect(),
			dry_run: pipeline.is_dry_run(),
			attempted,
			started_at,
			finished_at: started_at,
			receipts: Vec::new(),
			failure: None,
			pending: None,
		};

		match pipeline.submit(transactions).await {
			Ok(receipts) => {
				report.receipts = receipts;
				report.finished_at = current_timestamp();
				for receipt in &report.receipts {
					info!(
						index = receipt.transaction_index,
						reference = %receipt.reference(),
						"Receipt"
					);
				}
				if report.receipts.is_empty() {
					info!(run_id = %report.run_id, "Run produced no receipts");
				}

				self.persist(&report).await?;
				self.write_receipts(&report.receipts, options).await?;
				info!(run_id = %report.run_id, receipts = report.receipts.len(), "Run completed");
				Ok(report)
			},
			Err(cause) => {
				let confirmed = cause.confirmed_receipts().to_vec();
				error!(
					run_id = %report.run_id,
					attempted,
					confirmed = confirmed.len(),
					error = %cause,
					"Run failed"
				);
				for receipt in &confirmed {
					warn!(
						index = receipt.transaction_index,
						reference = %receipt.reference(),
						"Already confirmed, do not resubmit"
					);
				}
				if let Some(hash) = cause.pending_hash() {
					warn!(tx_hash = %hash, "Broadcast may still land, check it before resubmitting");
				}

				report.receipts = confirmed.clone();
				report.failure = Some(cause.to_string());
				report.pending = cause.pending_hash().map(|hash| hash.to_string());
				report.finished_at = current_timestamp();
				if let Err(e) = self.persist(&report).await {
					warn!(run_id = %report.run_id, error = %e, "Failed to persist failed run");
				}
				if let Err(e) = self.write_receipts(&confirmed, options).await {
					warn!(run_id = %report.run_id, error = %e, "Failed to write confirmed receipts");
				}

				Err(OrchestratorError::Failed {
					attempted,
					cause,
					confirmed,
				})
			},
		}
	}

	/// Loads a previously persisted run.
	pub async fn report(&self, run_id: &str) -> Result<RunReport, OrchestratorError> {
		Ok(self.storage.retrieve(StorageKey::Runs, run_id).await?)
	}

	/// Looks up which run landed a transaction hash or proposal id.
	pub async fn find_receipt(
		&self,
		reference: &str,
	) -> Result<ReceiptIndexEntry, OrchestratorError> {
		Ok(self
			.storage
			.retrieve(StorageKey::ReceiptByTxHash, &reference.to_lowercase())
			.await?)
	}

	/// Deletes a persisted run and the receipt index entries pointing at it.
	pub async fn forget_run(&self, run_id: &str) -> Result<RunReport, OrchestratorError> {
		let report: RunReport = self.storage.retrieve(StorageKey::Runs, run_id).await?;

		for receipt in report.receipts.iter().filter(|r| !r.outcome.is_simulated()) {
			let reference = receipt.reference().to_lowercase();
			match self
				.storage
				.retrieve::<ReceiptIndexEntry>(StorageKey::ReceiptByTxHash, &reference)
				.await
			{
				Ok(entry) if entry.run_id == run_id => {
					self.storage
						.remove(StorageKey::ReceiptByTxHash, &reference)
						.await?;
				},
				Ok(_) | Err(StorageError::NotFound) => {},
				Err(e) => return Err(e.into()),
			}
		}
		self.storage.remove(StorageKey::Runs, run_id).await?;

		info!(run_id = %run_id, receipts = report.receipts.len(), "Forgot run");
		Ok(report)
	}

	async fn persist(&self, report: &RunReport) -> Result<(), StorageError> {
		if self.storage.exists(StorageKey::Runs, &report.run_id).await? {
			return Err(StorageError::AlreadyExists(format!("run {}", report.run_id)));
		}
		self.storage
			.store(StorageKey::Runs, &report.run_id, report)
			.await?;

		for receipt in report.receipts.iter().filter(|r| !r.outcome.is_simulated()) {
			let entry = ReceiptIndexEntry {
				run_id: report.run_id.clone(),
				transaction_index: receipt.transaction_index,
			};
			self.storage
				.store(
					StorageKey::ReceiptByTxHash,
					&receipt.reference().to_lowercase(),
					&entry,
				)
				.await?;
		}
		Ok(())
	}

	async fn write_receipts(
		&self,
		receipts: &[Receipt],
		options: &RunOptions,
	) -> Result<(), ConfigError> {
		match &options.receipts_path {
			Some(path) if !receipts.is_empty() => {
				write_document(path, &receipts).await?;
				info!(path = %path.display(), count = receipts.len(), "Wrote receipts");
				Ok(())
			},
			_ => Ok(()),
		}
	}
}
