//! Batch Runner Integration Tests
//!
//! Input order, skip handling, failure isolation, re-run behavior and the
//! run log.

mod common;

use tempfile::TempDir;
use uuid::Uuid;

use portwright::adapters::CollaboratorOutcome;
use portwright::config::{self, NoDefaultConfig};
use portwright::core::report::{EXIT_PROJECT_FAILED, EXIT_SUCCESS};
use portwright::core::{summarize, BatchRunner, EventStore, Journal};
use portwright::domain::{EventType, Project, ProjectStatus};

use common::{action, well_behaved_set, Scripted};

fn project(workspace: &TempDir, name: &str) -> Project {
    Project::new(
        format!("https://example.org/org/{}.git", name),
        workspace.path(),
        name,
    )
    .unwrap()
}

fn runner() -> BatchRunner {
    BatchRunner::new(Journal::disabled(Uuid::new_v4()))
}

#[tokio::test]
async fn test_skipped_entry_is_reported_but_not_run() {
    let temp = TempDir::new().unwrap();
    let yaml = r#"
workspace: .
projects:
  - repo: https://example.org/org/alpha.git
    crate: alpha
  - repo: https://example.org/org/beta.git
    crate: beta
    skip: true
  - repo: https://example.org/org/gamma.git
    crate: gamma
"#;
    let config_path = temp.path().join("batch.yaml");
    std::fs::write(&config_path, yaml).unwrap();

    let invocation = config::resolve(
        &[config_path.to_string_lossy().into_owned()],
        &NoDefaultConfig,
    )
    .unwrap();
    assert_eq!(invocation.projects.len(), 3);

    let collaborators = well_behaved_set();
    let batch = runner()
        .run_all(&invocation.projects, &common::pipeline(&collaborators))
        .await;

    let statuses: Vec<ProjectStatus> = batch.projects.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![
            ProjectStatus::Success,
            ProjectStatus::Skipped,
            ProjectStatus::Success
        ]
    );
    assert!(batch.projects[1].stage_results.is_empty());
    assert_eq!(collaborators[0].calls(), 2);
    assert!(!temp.path().join("legacy/beta").exists());

    let report = summarize(&batch);
    assert_eq!(report.totals.attempted, 2);
    assert_eq!(report.totals.succeeded, 2);
    assert_eq!(report.totals.failed, 0);
    assert_eq!(report.totals.skipped, 1);
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
}

#[tokio::test]
async fn test_failed_project_does_not_stop_the_batch() {
    let temp = TempDir::new().unwrap();
    let projects = vec![
        project(&temp, "alpha"),
        project(&temp, "beta"),
        project(&temp, "gamma"),
    ];

    let mut collaborators = well_behaved_set();
    collaborators[1] = Scripted::new(
        "extract",
        action(|req, _| {
            if req.project.crate_name().as_str() == "beta" {
                return Ok(CollaboratorOutcome::failed(Some(2), "parse error"));
            }
            common::write(&req.paths.representation, "# ok\n")?;
            Ok(CollaboratorOutcome::succeeded())
        }),
    );

    let batch = runner()
        .run_all(&projects, &common::pipeline(&collaborators))
        .await;

    let names: Vec<&str> = batch
        .projects
        .iter()
        .map(|p| p.project.crate_name().as_str())
        .collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);

    assert_eq!(batch.projects[0].status, ProjectStatus::Success);
    assert_eq!(batch.projects[1].status, ProjectStatus::Failed);
    assert_eq!(batch.projects[1].failed_at_stage.as_deref(), Some("extract"));
    assert_eq!(batch.projects[2].status, ProjectStatus::Success);

    assert_eq!(collaborators[2].calls(), 2);
    assert!(temp.path().join("crates/gamma/tests/smoke.rs").is_file());
    assert!(!temp.path().join("crates/beta").exists());

    let report = summarize(&batch);
    assert_eq!(report.exit_code(), EXIT_PROJECT_FAILED);
    assert_eq!(report.projects[1].failed_stage.as_deref(), Some("extract"));
    assert!(report.projects[1]
        .error_detail
        .as_deref()
        .unwrap_or_default()
        .contains("parse error"));
}

#[tokio::test]
async fn test_rerun_reaches_same_outcome() {
    let temp = TempDir::new().unwrap();
    let projects = vec![project(&temp, "alpha"), project(&temp, "beta")];
    let collaborators = well_behaved_set();
    let pipeline = common::pipeline(&collaborators);

    let first = runner().run_all(&projects, &pipeline).await;
    let second = runner().run_all(&projects, &pipeline).await;

    for (a, b) in first.projects.iter().zip(&second.projects) {
        assert_eq!(a.status, b.status);
        assert_eq!(a.artifacts_produced(), b.artifacts_produced());
    }

    // Checkouts from the first run are reused
    assert_eq!(collaborators[0].calls(), 2);
    assert!(second.projects.iter().all(|p| p.stage_results[0].reused));
    assert_eq!(collaborators[1].calls(), 4);
}

#[tokio::test]
async fn test_empty_batch() {
    let batch = runner()
        .run_all(&[], &common::pipeline(&well_behaved_set()))
        .await;

    assert!(batch.projects.is_empty());
    assert!(batch.completed_at.is_some());
    assert_eq!(summarize(&batch).exit_code(), EXIT_SUCCESS);
}

#[tokio::test]
async fn test_run_log_records_lifecycle() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open(temp.path(), run_id).await.unwrap();
    let journal = Journal::new(run_id, store);

    let projects = vec![
        project(&temp, "alpha"),
        project(&temp, "beta").with_skip(true),
    ];
    let mut collaborators = well_behaved_set();
    collaborators[4] = common::failing("validate", "1 test failed");

    let batch = BatchRunner::new(journal)
        .run_all(&projects, &common::pipeline(&collaborators))
        .await;
    assert_eq!(batch.run_id, run_id);

    let events = EventStore::open(temp.path(), run_id)
        .await
        .unwrap()
        .replay()
        .await
        .unwrap();

    assert_eq!(events.first().map(|e| e.event_type), Some(EventType::RunStarted));
    assert_eq!(events.last().map(|e| e.event_type), Some(EventType::RunCompleted));
    assert!(events.iter().all(|e| e.run_id == run_id));

    let of_type = |t: EventType| events.iter().filter(move |e| e.event_type == t);

    assert_eq!(of_type(EventType::ProjectSkipped).count(), 1);
    assert_eq!(
        of_type(EventType::ProjectSkipped).next().and_then(|e| e.project.as_deref()),
        Some("beta")
    );
    assert_eq!(of_type(EventType::StageCompleted).count(), 4);

    let failed: Vec<_> = of_type(EventType::StageFailed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].stage.as_deref(), Some("validate"));
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("1 test failed"));

    assert_eq!(of_type(EventType::ProjectFailed).count(), 1);
    assert_eq!(EventStore::list_runs(temp.path()).await.unwrap(), vec![run_id]);
}

#[tokio::test]
async fn test_run_log_key_correlates_stage_events() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open(temp.path(), run_id).await.unwrap();

    let collaborators = well_behaved_set();
    BatchRunner::new(Journal::new(run_id, store))
        .run_all(&[project(&temp, "alpha")], &common::pipeline(&collaborators))
        .await;

    let events = EventStore::open(temp.path(), run_id)
        .await
        .unwrap()
        .replay()
        .await
        .unwrap();

    let keys_of = |stage: &str| -> Vec<&str> {
        events
            .iter()
            .filter(|e| e.stage.as_deref() == Some(stage))
            .map(|e| e.idempotency_key.as_str())
            .collect()
    };

    let extract = keys_of("extract");
    assert_eq!(extract.len(), 2);
    assert_eq!(extract[0], extract[1]);
    assert!(extract[0].starts_with(&format!("{}:alpha:extract:", run_id)));
    assert_ne!(extract[0], keys_of("generate")[0]);
}
