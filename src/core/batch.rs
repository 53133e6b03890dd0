//! Batch runner: one pipeline execution per project, in input order.
//!
//! Projects run sequentially and in isolation. A failed project is recorded
//! and the loop moves on; nothing a project does changes another project's
//! outcome.

use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::{BatchRun, DerivedPaths, Event, EventType, Project, ProjectRun, ProjectStatus};

use super::event_store::Journal;
use super::executor::StageExecutor;
use super::pipeline::Pipeline;

/// Runs a pipeline over a list of projects
#[derive(Debug, Clone)]
pub struct BatchRunner {
    journal: Journal,
    executor: StageExecutor,
}

impl BatchRunner {
    pub fn new(journal: Journal) -> Self {
        Self {
            executor: StageExecutor::new(journal.clone()),
            journal,
        }
    }

    /// Execute the pipeline for every project
    #[instrument(skip_all, fields(run_id = %self.journal.run_id(), projects = projects.len()))]
    pub async fn run_all(&self, projects: &[Project], pipeline: &Pipeline) -> BatchRun {
        let run_id = self.journal.run_id();
        let mut batch = BatchRun::new(run_id);
        info!("Starting batch run");

        self.journal
            .record(Event::new(
                run_id,
                EventType::RunStarted,
                format!("{}:start", run_id),
                format!("Batch of {} project(s) started", projects.len()),
            ))
            .await;

        for project in projects {
            if project.skip() {
                info!(crate_name = %project.crate_name(), "Skipping project");

                self.journal
                    .record(
                        Event::new(
                            run_id,
                            EventType::ProjectSkipped,
                            format!("{}:{}:skip", run_id, project.crate_name()),
                            format!("Project '{}' skipped", project.crate_name()),
                        )
                        .with_project(project.crate_name().as_str()),
                    )
                    .await;

                batch.projects.push(ProjectRun::skipped(project.clone()));
                continue;
            }

            let paths = DerivedPaths::for_project(project);
            let run = self.executor.run(project, &paths, pipeline).await;
            batch.projects.push(run);
        }

        batch.completed_at = Some(Utc::now());

        let succeeded = batch.count(ProjectStatus::Success);
        let failed = batch.count(ProjectStatus::Failed);
        let skipped = batch.count(ProjectStatus::Skipped);
        info!(succeeded, failed, skipped, "Batch run finished");

        self.journal
            .record(Event::new(
                run_id,
                EventType::RunCompleted,
                format!("{}:complete", run_id),
                format!(
                    "{} succeeded, {} failed, {} skipped",
                    succeeded, failed, skipped
                ),
            ))
            .await;

        batch
    }
}
