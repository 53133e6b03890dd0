//! Pipeline definitions.
//!
//! A pipeline is an ordered list of stages, each delegating to an external
//! collaborator and guarded by a validation gate. The standard migration
//! pipeline is built from [`PipelineSettings`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::{Collaborator, CommandCollaborator};
use crate::config::settings::PipelineSettings;
use crate::domain::PathSlot;

pub const FETCH: &str = "fetch";
pub const EXTRACT: &str = "extract";
pub const GENERATE: &str = "generate";
pub const TESTS: &str = "tests";
pub const VALIDATE: &str = "validate";

/// Stage names of the standard pipeline, in execution order
pub const STANDARD_STAGES: [&str; 5] = [FETCH, EXTRACT, GENERATE, TESTS, VALIDATE];

/// Validation gate applied after a collaborator reports success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Directory exists and has at least one entry
    NonEmptyDir(PathSlot),

    /// File exists and is non-empty
    NonEmptyFile(PathSlot),

    /// Every glob pattern, relative to `root`, matches at least one file
    RequiredFiles { root: PathSlot, patterns: Vec<String> },

    /// Nothing beyond the collaborator's own success signal
    SuccessSignal,
}

/// A single stage in a pipeline
#[derive(Clone)]
pub struct Stage {
    /// Stage name (unique within pipeline)
    pub name: String,

    /// 1-based position; indices form 1..=N without gaps
    pub index: u32,

    /// Paths handed to the collaborator
    pub inputs: Vec<PathSlot>,

    /// Paths this stage is responsible for producing
    pub outputs: Vec<PathSlot>,

    pub gate: Gate,

    pub collaborator: Arc<dyn Collaborator>,

    pub timeout: Duration,

    pub retry_policy: RetryPolicy,

    /// Skip the collaborator when the gate already holds before invocation
    pub reuse_existing: bool,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("gate", &self.gate)
            .field("collaborator", &self.collaborator.name())
            .field("timeout", &self.timeout)
            .field("retry_policy", &self.retry_policy)
            .field("reuse_existing", &self.reuse_existing)
            .finish()
    }
}

impl Stage {
    /// Stage with default timeout, no retries and no reuse
    pub fn new(
        name: impl Into<String>,
        index: u32,
        gate: Gate,
        collaborator: Arc<dyn Collaborator>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            inputs: Vec::new(),
            outputs: Vec::new(),
            gate,
            collaborator,
            timeout: Duration::from_secs(crate::config::settings::DEFAULT_STEP_TIMEOUT_SECONDS),
            retry_policy: RetryPolicy::default(),
            reuse_existing: false,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<PathSlot>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<PathSlot>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_reuse_existing(mut self, reuse_existing: bool) -> Self {
        self.reuse_existing = reuse_existing;
        self
    }
}

/// Errors in a pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Pipeline must have at least one stage")]
    Empty,

    #[error("Stage name '{name}' is used more than once")]
    DuplicateName { name: String },

    #[error("Stage '{name}' has index {found}, expected {expected} (indices must run 1..N without gaps)")]
    IndexGap {
        name: String,
        expected: u32,
        found: u32,
    },

    #[error("Stage '{name}' has an empty name or command")]
    EmptyDefinition { name: String },

    #[error("Settings override unknown stage '{name}' (known: fetch, extract, generate, tests, validate)")]
    UnknownStage { name: String },

    #[error("Stage '{stage}' has invalid required file pattern '{pattern}': {message}")]
    InvalidPattern {
        stage: String,
        pattern: String,
        message: String,
    },
}

/// A validated, index-ordered list of stages
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Validate and order a list of stages
    pub fn new(mut stages: Vec<Stage>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }

        stages.sort_by_key(|s| s.index);

        let mut names = HashSet::new();
        for (position, stage) in stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(PipelineError::EmptyDefinition {
                    name: stage.name.clone(),
                });
            }

            if !names.insert(stage.name.as_str()) {
                return Err(PipelineError::DuplicateName {
                    name: stage.name.clone(),
                });
            }

            let expected = position as u32 + 1;
            if stage.index != expected {
                return Err(PipelineError::IndexGap {
                    name: stage.name.clone(),
                    expected,
                    found: stage.index,
                });
            }
        }

        Ok(Self { stages })
    }

    /// The fetch → extract → generate → tests → validate pipeline
    pub fn standard(settings: &PipelineSettings) -> Result<Self, PipelineError> {
        settings.validate()?;

        let mut stages = Vec::with_capacity(STANDARD_STAGES.len());
        for (position, name) in STANDARD_STAGES.iter().enumerate() {
            stages.push(standard_stage(name, position as u32 + 1, settings)?);
        }

        Self::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

fn standard_stage(
    name: &str,
    index: u32,
    settings: &PipelineSettings,
) -> Result<Stage, PipelineError> {
    use PathSlot::{ArtifactOutput, LegacySource, Representation};

    let overrides = settings.stages.get(name);
    let command = overrides
        .and_then(|o| o.command.clone())
        .unwrap_or_else(|| default_command(name));

    if command.is_empty() || command[0].trim().is_empty() {
        return Err(PipelineError::EmptyDefinition {
            name: name.to_string(),
        });
    }

    let required = |defaults: &[&str]| -> Vec<String> {
        overrides
            .and_then(|o| o.required_files.clone())
            .unwrap_or_else(|| defaults.iter().map(|s| s.to_string()).collect())
    };

    let (inputs, outputs, gate, reuse) = match name {
        FETCH => (vec![], vec![LegacySource], Gate::NonEmptyDir(LegacySource), true),
        EXTRACT => (
            vec![LegacySource],
            vec![Representation],
            Gate::NonEmptyFile(Representation),
            false,
        ),
        GENERATE => (
            vec![Representation, LegacySource],
            vec![ArtifactOutput],
            Gate::RequiredFiles {
                root: ArtifactOutput,
                patterns: required(&["Cargo.toml", "src/**/*.rs"]),
            },
            false,
        ),
        TESTS => (
            vec![ArtifactOutput],
            vec![ArtifactOutput],
            Gate::RequiredFiles {
                root: ArtifactOutput,
                patterns: required(&["tests/**/*.rs"]),
            },
            false,
        ),
        VALIDATE => (vec![ArtifactOutput], vec![], Gate::SuccessSignal, false),
        other => {
            return Err(PipelineError::UnknownStage {
                name: other.to_string(),
            })
        }
    };

    let timeout = overrides
        .and_then(|o| o.timeout_seconds)
        .unwrap_or(settings.step_timeout_seconds);
    let reuse = overrides.and_then(|o| o.reuse_existing).unwrap_or(reuse);

    Ok(Stage::new(
        name,
        index,
        gate,
        Arc::new(CommandCollaborator::new(name, command)),
    )
    .with_inputs(inputs)
    .with_outputs(outputs)
    .with_timeout(Duration::from_secs(timeout))
    .with_retry_policy(settings.retry_policy.clone())
    .with_reuse_existing(reuse))
}

/// Default argv template for a standard stage
pub fn default_command(stage: &str) -> Vec<String> {
    let argv: &[&str] = match stage {
        FETCH => &["git", "clone", "--depth", "1", "{repo}", "{legacy}"],
        EXTRACT => &["portwright-extract", "{legacy}", "{representation}"],
        GENERATE => &["portwright-generate", "{representation}", "{legacy}", "{artifact}"],
        TESTS => &["portwright-testgen", "{artifact}"],
        VALIDATE => &["cargo", "test", "--manifest-path", "{artifact}/Cargo.toml"],
        _ => &[],
    };
    argv.iter().map(|s| s.to_string()).collect()
}

/// Retry policy for collaborator errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    1
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
