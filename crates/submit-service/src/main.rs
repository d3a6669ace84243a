//! Main entry point for the `submit` binary.
//!
//! Submits a batch of transactions to one chain under a declarative
//! submission strategy, or manages the signing keys the submitters use.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use submit_config::{load_strategy, Config};
use submit_core::{BatchSource, RunOptions};
use submit_types::Receipt;

mod factory_registry;
mod keys;

use keys::{KeyAction, KeyCommand};

/// Command-line arguments for the submission service.
#[derive(Parser, Debug)]
#[command(name = "submit", author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, global = true, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, global = true, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Submit a transaction batch under a strategy
	Run {
		/// Strategy document (YAML or JSON)
		#[arg(short, long)]
		strategy: Option<PathBuf>,

		/// Transaction batch document (YAML or JSON)
		#[arg(short, long)]
		transactions: PathBuf,

		/// Where to write the receipts document
		#[arg(short, long, default_value = "receipts.yaml")]
		receipts: PathBuf,

		/// Validate and simulate without broadcasting
		#[arg(long)]
		dry_run: bool,
	},
	/// Delete a persisted run and its receipt index entries
	Forget {
		/// Id of the run to delete
		run_id: String,
	},
	/// Manage signing keys in the configured key backend
	Keys {
		#[arg(value_enum)]
		action: KeyAction,

		/// Key role (validator, relayer, deployer, submitter)
		#[arg(long)]
		role: String,

		/// Chain of a validator key
		#[arg(long)]
		chain: Option<String>,

		/// Index of a validator key within its chain
		#[arg(long)]
		index: Option<u32>,
	},
}

/// Main entry point for the submission service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Runs the requested subcommand
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_target(true)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path is not valid UTF-8: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!(environment = %config.service.environment, "Loaded configuration");

	match args.command {
		Command::Run {
			strategy,
			transactions,
			receipts,
			dry_run,
		} => run(config, strategy, transactions, receipts, dry_run).await,
		Command::Forget { run_id } => {
			let orchestrator = factory_registry::build_orchestrator_from_config(config)?;
			let report = orchestrator.forget_run(&run_id).await?;
			println!("{}", render_receipts(&report.receipts)?);
			Ok(())
		},
		Command::Keys {
			action,
			role,
			chain,
			index,
		} => {
			let command = KeyCommand {
				action,
				role,
				chain,
				index,
			};
			if let Some(address) = keys::run_key_command(&config, &command).await? {
				println!("{}", serde_json::to_string_pretty(&address)?);
			}
			Ok(())
		},
	}
}

async fn run(
	config: Config,
	strategy: Option<PathBuf>,
	transactions: PathBuf,
	receipts: PathBuf,
	dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
	let strategy = match strategy {
		Some(path) => Some(load_strategy(path).await?),
		None => None,
	};

	let orchestrator = factory_registry::build_orchestrator_from_config(config)?;
	let options = RunOptions {
		dry_run,
		receipts_path: Some(receipts),
	};

	match orchestrator
		.run(strategy.as_ref(), BatchSource::File(transactions), &options)
		.await
	{
		Ok(report) => {
			tracing::info!(
				run_id = %report.run_id,
				dry_run = report.dry_run,
				"Receipts:\n{}",
				render_receipts(&report.receipts)?
			);
			Ok(())
		},
		Err(e) => {
			let confirmed = e.confirmed_receipts();
			if !confirmed.is_empty() {
				tracing::error!("Confirmed before the failure:\n{}", render_receipts(confirmed)?);
			}
			if let Some(hash) = e.pending_hash() {
				tracing::error!(tx_hash = %hash, "Unconfirmed broadcast, check it before resubmitting");
			}
			Err(e.into())
		},
	}
}

fn render_receipts(receipts: &[Receipt]) -> Result<String, serde_yaml::Error> {
	if receipts.is_empty() {
		return Ok("[]".to_string());
	}
	serde_yaml::to_string(receipts)
}
