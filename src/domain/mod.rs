//! Domain types for the migration orchestrator.
//!
//! This module contains the core data structures:
//! - Project: one migration unit
//! - Paths: deterministic workspace layout per project
//! - Run: stage, project and batch outcomes
//! - Events: run log records

pub mod events;
pub mod paths;
pub mod project;
pub mod run;

// Re-export commonly used types
pub use events::{Event, EventType};
pub use paths::{anchored, derive, legacy_name, DerivedPaths, PathSlot};
pub use project::{CrateName, Project};
pub use run::{
    BatchRun, FailureKind, ProjectRun, ProjectStatus, StageFailure, StageResult, StageStatus,
};
