//! Append-only run log with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) under
//! `<workspace>/.portwright/runs/<run-id>/events.jsonl`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use crate::domain::Event;

/// Directory under the workspace holding orchestrator state
pub const STATE_DIR: &str = ".portwright";

/// File-based event store using JSONL format
#[derive(Debug)]
pub struct EventStore {
    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl EventStore {
    /// Create or open the event store for a run
    pub async fn open(workspace: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = Self::base_directory(workspace).join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self { events_path })
    }

    /// Base directory for all runs in a workspace
    pub fn base_directory(workspace: &Path) -> PathBuf {
        workspace.join(STATE_DIR).join("runs")
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// List all run IDs recorded in a workspace
    pub async fn list_runs(workspace: &Path) -> Result<Vec<Uuid>> {
        let base_dir = Self::base_directory(workspace);

        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(&base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

/// Best-effort handle to a run's event log.
///
/// Log failures are reported as warnings and never change a project's
/// outcome. A disabled journal records nothing.
#[derive(Debug, Clone)]
pub struct Journal {
    run_id: Uuid,
    store: Option<Arc<EventStore>>,
}

impl Journal {
    pub fn new(run_id: Uuid, store: EventStore) -> Self {
        Self {
            run_id,
            store: Some(Arc::new(store)),
        }
    }

    /// Journal that only carries the run id
    pub fn disabled(run_id: Uuid) -> Self {
        Self {
            run_id,
            store: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn store(&self) -> Option<&EventStore> {
        self.store.as_deref()
    }

    /// Append an event, warning instead of failing
    pub async fn record(&self, event: Event) {
        if let Some(store) = &self.store {
            if let Err(e) = store.append(&event).await {
                warn!(error = %e, event_type = ?event.event_type, "Failed to record event");
            }
        }
    }
}

/// Generate the idempotency key for a stage of a project.
///
/// The key is a correlation id for the run log: every event of one stage
/// carries it, with retry events adding a `:retry:<attempt>` suffix.
/// Nothing deduplicates on it; re-run behavior comes from the stage gates
/// and `reuse_existing`.
pub fn generate_idempotency_key(run_id: Uuid, crate_name: &str, stage: &str, input: &str) -> String {
    let input_hash = hash_input(input);
    format!("{}:{}:{}:{}", run_id, crate_name, stage, input_hash)
}

/// Hash input content (first 16 chars of SHA256)
pub fn hash_input(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::open(temp.path(), run_id).await.unwrap();

        for (i, event_type) in [EventType::RunStarted, EventType::ProjectStarted, EventType::StageStarted]
            .into_iter()
            .enumerate()
        {
            let event = Event::new(run_id, event_type, format!("key-{}", i), format!("event {}", i));
            store.append(&event).await.unwrap();
        }

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[2].event_type, EventType::StageStarted);
        assert!(store
            .events_path()
            .starts_with(temp.path().join(".portwright/runs")));
    }

    #[tokio::test]
    async fn test_replay_missing_log_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = EventStore::open(temp.path(), Uuid::new_v4()).await.unwrap();
        assert!(store.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_runs() {
        let temp = TempDir::new().unwrap();
        assert!(EventStore::list_runs(temp.path()).await.unwrap().is_empty());

        let run_id = Uuid::new_v4();
        EventStore::open(temp.path(), run_id).await.unwrap();
        std::fs::create_dir_all(EventStore::base_directory(temp.path()).join("not-a-run")).unwrap();

        assert_eq!(EventStore::list_runs(temp.path()).await.unwrap(), vec![run_id]);
    }

    #[tokio::test]
    async fn test_disabled_journal_records_nothing() {
        let journal = Journal::disabled(Uuid::new_v4());
        journal
            .record(Event::new(journal.run_id(), EventType::RunStarted, "k".into(), "s".into()))
            .await;
        assert!(journal.store().is_none());
    }

    #[test]
    fn test_idempotency_key_format() {
        let run_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = generate_idempotency_key(run_id, "widget", "extract", "legacy/widget");

        assert!(key.starts_with("550e8400-e29b-41d4-a716-446655440000:widget:extract:"));
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 16);
    }

    #[test]
    fn test_input_hash_consistency() {
        assert_eq!(hash_input("test input"), hash_input("test input"));
        assert_ne!(hash_input("test input"), hash_input("different input"));
        assert_eq!(hash_input("x").len(), 16);
    }
}
