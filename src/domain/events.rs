//! Event types for the run log.
//!
//! Every state change of a batch run is appended to a JSONL log so a run can
//! be inspected after the fact without re-running any stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event in the append-only run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The batch run this event belongs to
    pub run_id: Uuid,

    /// Crate name of the project (if applicable)
    pub project: Option<String>,

    /// Stage name (if applicable)
    pub stage: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Correlates the events of one stage attempt chain, format
    /// "{run_id}:{crate}:{stage}:{input_hash}". Recorded for auditing only.
    pub idempotency_key: String,

    /// Human-readable summary
    pub payload_summary: String,

    /// Collaborator attempt number (stage events only)
    pub attempt: Option<u32>,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        event_type: EventType,
        idempotency_key: String,
        payload_summary: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            project: None,
            stage: None,
            event_type,
            idempotency_key,
            payload_summary,
            attempt: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Attach the project the event concerns
    pub fn with_project(mut self, crate_name: impl Into<String>) -> Self {
        self.project = Some(crate_name.into());
        self
    }

    /// Attach the stage the event concerns
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events recorded during a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunCompleted,
    ProjectStarted,
    ProjectSkipped,
    ProjectCompleted,
    ProjectFailed,
    StageStarted,
    StageCompleted,

    /// Stage failed permanently
    StageFailed,

    /// Collaborator failed and will be invoked again
    StageRetrying,
}
