//! Collaborator interfaces for external tools.
//!
//! Every stage delegates its real work to a collaborator: a black box that
//! receives the stage's inputs and reports a terminal outcome. The executor
//! never looks inside; it only judges the outcome and the files left behind.

pub mod command;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{DerivedPaths, Project};

pub use command::CommandCollaborator;

/// Everything a collaborator is told about the stage it serves
#[derive(Debug, Clone)]
pub struct CollaboratorRequest {
    /// Stage being executed
    pub stage: String,

    /// Project the stage runs for
    pub project: Project,

    /// Full path layout of the project
    pub paths: DerivedPaths,

    /// Resolved input paths the stage declares
    pub inputs: Vec<PathBuf>,
}

/// Terminal outcome reported by a collaborator
#[derive(Debug, Clone)]
pub struct CollaboratorOutcome {
    /// The collaborator's own success signal
    pub success: bool,

    /// Process exit code (if any)
    pub exit_code: Option<i32>,

    /// Captured diagnostic output, trimmed
    pub diagnostics: String,
}

impl CollaboratorOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            diagnostics: String::new(),
        }
    }

    pub fn failed(exit_code: Option<i32>, diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Trait for external stage collaborators
///
/// Returning `Err` means the collaborator could not be run at all; a
/// collaborator that ran and reported failure returns an outcome with
/// `success == false`. Timeouts are enforced by the caller, so
/// implementations must be safe to drop mid-flight.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Human-readable collaborator name
    fn name(&self) -> &str;

    /// Run the collaborator to completion
    async fn invoke(&self, request: &CollaboratorRequest) -> Result<CollaboratorOutcome>;
}
