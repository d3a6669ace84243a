//! Core of the transaction submission system.
//!
//! Ties the submission crates together: the [`ChainRegistry`] resolves chain
//! names into runtimes, the [`SubmitterBuilder`] turns a strategy into a
//! [`Pipeline`] of transformers followed by one submitter, and the
//! [`Orchestrator`] drives a whole run from batch document to persisted
//! receipts.

pub mod builder;
pub mod orchestrator;
pub mod registry;

pub use builder::{
	BuilderError, Pipeline, PipelineError, PipelineShape, SubmissionFactories, SubmitterBuilder,
};
pub use orchestrator::{
	BatchSource, Orchestrator, OrchestratorError, ReceiptIndexEntry, RunOptions, RunReport,
};
pub use registry::ChainRegistry;
