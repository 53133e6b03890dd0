//! portwright - Multi-stage migration pipeline orchestrator
//!
//! Drives legacy repositories through a fixed sequence of stages, each
//! delegated to an external collaborator and checked by a validation gate
//! before the next stage may start.
//!
//! # Architecture
//!
//! - Configuration is resolved from positional arguments or a YAML file
//! - Every project gets a deterministic path layout under its workspace
//! - Stages run in order; the first failure ends the project
//! - Projects run in isolation; one failure never stops the batch
//! - Every state change is appended to a per-run JSONL event log
//!
//! # Modules
//!
//! - `adapters`: Collaborator trait and the external command collaborator
//! - `config`: Configuration resolution and pipeline settings
//! - `core`: Pipeline, gates, executor, batch runner, reports, event log
//! - `domain`: Data structures (Project, DerivedPaths, runs, events)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Migrate a single repository
//! portwright run https://example.org/org/widget.git ./work widget
//!
//! # Migrate every project listed in a config file
//! portwright run migrations.yaml
//!
//! # Inspect a past run
//! portwright status ./work <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{Collaborator, CollaboratorOutcome, CollaboratorRequest};
pub use config::{resolve, ConfigError, Invocation};
pub use core::{summarize, BatchRunner, Pipeline, Report, StageExecutor};
pub use domain::{derive, BatchRun, DerivedPaths, Project, ProjectRun, ProjectStatus};
