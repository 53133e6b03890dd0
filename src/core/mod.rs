//! Core orchestration logic.
//!
//! This module contains:
//! - Pipeline: stage definitions, gates and retry policy
//! - Gate: output validation after each stage
//! - Executor: runs the stages of one project
//! - Batch: runs every project in order with failure isolation
//! - Report: run summaries and exit codes
//! - EventStore: append-only run log

pub mod batch;
pub mod event_store;
pub mod executor;
pub mod gate;
pub mod pipeline;
pub mod report;

// Re-export commonly used types
pub use batch::BatchRunner;
pub use event_store::{generate_idempotency_key, hash_input, EventStore, Journal};
pub use executor::StageExecutor;
pub use pipeline::{Gate, Pipeline, PipelineError, RetryPolicy, Stage};
pub use report::{summarize, ProjectSummary, Report, Totals};
