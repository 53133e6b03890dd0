//! Pipeline settings read from the `settings` key of a config document.
//!
//! ```yaml
//! settings:
//!   step_timeout_seconds: 1800
//!   retry_policy:
//!     max_attempts: 2
//!   stages:
//!     validate:
//!       command: ["cargo", "build", "--manifest-path", "{artifact}/Cargo.toml"]
//!       timeout_seconds: 600
//! ```

use std::collections::BTreeMap;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::core::pipeline::{PipelineError, RetryPolicy, STANDARD_STAGES};

/// Per-stage timeout used when neither the stage nor the settings set one
pub const DEFAULT_STEP_TIMEOUT_SECONDS: u64 = 1800;

fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECONDS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    /// Timeout applied to every stage without its own override
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,

    /// Retry policy for collaborator errors (default: no retries)
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Per-stage overrides keyed by stage name
    #[serde(default)]
    pub stages: BTreeMap<String, StageOverride>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            step_timeout_seconds: default_step_timeout(),
            retry_policy: RetryPolicy::default(),
            stages: BTreeMap::new(),
        }
    }
}

impl PipelineSettings {
    /// Reject overrides for unknown stages and malformed gate patterns
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, overrides) in &self.stages {
            if !STANDARD_STAGES.contains(&name.as_str()) {
                return Err(PipelineError::UnknownStage { name: name.clone() });
            }

            for pattern in overrides.required_files.iter().flatten() {
                Pattern::new(pattern).map_err(|e| PipelineError::InvalidPattern {
                    stage: name.clone(),
                    pattern: pattern.clone(),
                    message: e.msg.to_string(),
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageOverride {
    /// Replacement argv template
    pub command: Option<Vec<String>>,

    pub timeout_seconds: Option<u64>,

    /// Replacement glob patterns for file-based gates
    pub required_files: Option<Vec<String>>,

    pub reuse_existing: Option<bool>,
}
