//! Stage, project and batch outcomes.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::project::Project;

/// Outcome of a single stage invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
}

/// Broad failure category, so operators can tell a crashed tool from a
/// tool that produced wrong or incomplete output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CollaboratorError,
    ValidationGateFailure,
}

/// Why a stage failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    /// The collaborator could not run or reported failure
    #[error("collaborator error: {message}")]
    Collaborator { message: String },

    /// The collaborator did not terminate within the stage timeout
    #[error("collaborator error: timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    /// The collaborator ran but its declared outputs fail the gate
    #[error("output validation failed: {reason}")]
    Gate { reason: String },
}

impl StageFailure {
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator {
            message: message.into(),
        }
    }

    pub fn gate(reason: impl Into<String>) -> Self {
        Self::Gate {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Collaborator { .. } | Self::TimedOut { .. } => FailureKind::CollaboratorError,
            Self::Gate { .. } => FailureKind::ValidationGateFailure,
        }
    }

    /// Whether a retry policy may re-invoke the collaborator
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::CollaboratorError
    }
}

/// Result of one stage for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,

    /// 1-based position in the pipeline
    pub index: u32,

    pub status: StageStatus,

    /// Present iff `status` is `Failed`
    pub error: Option<StageFailure>,

    /// Declared outputs that exist on disk after the stage
    pub artifacts_produced: Vec<PathBuf>,

    /// Collaborator invocations made (0 when reused)
    pub attempts: u32,

    pub duration_ms: u64,

    /// Outputs were already present and the collaborator was not invoked
    #[serde(default)]
    pub reused: bool,
}

impl StageResult {
    pub fn success(
        stage_name: impl Into<String>,
        index: u32,
        artifacts_produced: Vec<PathBuf>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            index,
            status: StageStatus::Success,
            error: None,
            artifacts_produced,
            attempts,
            duration_ms,
            reused: false,
        }
    }

    pub fn failed(
        stage_name: impl Into<String>,
        index: u32,
        failure: StageFailure,
        artifacts_produced: Vec<PathBuf>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            index,
            status: StageStatus::Failed,
            error: Some(failure),
            artifacts_produced,
            attempts,
            duration_ms,
            reused: false,
        }
    }

    /// Mark a success as satisfied by pre-existing outputs
    pub fn into_reused(mut self) -> Self {
        self.reused = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Overall status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// All stage results for one project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectRun {
    pub project: Project,

    /// In execution order, truncated at the first failure
    pub stage_results: Vec<StageResult>,

    pub status: ProjectStatus,

    /// Name of the failing stage, present iff `status` is `Failed`
    pub failed_at_stage: Option<String>,
}

impl ProjectRun {
    /// A project that never entered the executor
    pub fn skipped(project: Project) -> Self {
        Self {
            project,
            stage_results: Vec::new(),
            status: ProjectStatus::Skipped,
            failed_at_stage: None,
        }
    }

    /// Assemble a run from the results the executor collected.
    ///
    /// The executor stops at the first failure, so a failed result can only
    /// be the last one.
    pub fn from_results(project: Project, stage_results: Vec<StageResult>) -> Self {
        let failed_at_stage = stage_results
            .iter()
            .find(|r| !r.is_success())
            .map(|r| r.stage_name.clone());

        let status = if failed_at_stage.is_some() {
            ProjectStatus::Failed
        } else {
            ProjectStatus::Success
        };

        Self {
            project,
            stage_results,
            status,
            failed_at_stage,
        }
    }

    /// The first (and only) failed stage result
    pub fn failure(&self) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| !r.is_success())
    }

    /// Union of artifacts produced by all stages, in stage order
    pub fn artifacts_produced(&self) -> Vec<PathBuf> {
        let mut artifacts: Vec<PathBuf> = Vec::new();
        for path in self.stage_results.iter().flat_map(|r| &r.artifacts_produced) {
            if !artifacts.contains(path) {
                artifacts.push(path.clone());
            }
        }
        artifacts
    }
}

/// Result of one invocation over all resolved projects
#[derive(Debug, Clone, Serialize)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// One entry per input project, in input order
    pub projects: Vec<ProjectRun>,
}

impl BatchRun {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            completed_at: None,
            projects: Vec::new(),
        }
    }

    pub fn count(&self, status: ProjectStatus) -> usize {
        self.projects.iter().filter(|p| p.status == status).count()
    }
}
