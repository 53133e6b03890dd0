//! Stage executor: runs the pipeline for one project.
//!
//! Stages run strictly in index order. Each collaborator invocation is
//! bounded by the stage timeout, its outcome is judged by the stage gate,
//! and the first failed stage ends the project. Partial artifacts of a
//! failed stage are left in place for debugging; only a retry clears them
//! first.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{CollaboratorOutcome, CollaboratorRequest};
use crate::domain::{
    DerivedPaths, Event, EventType, PathSlot, Project, ProjectRun, ProjectStatus, StageFailure,
    StageResult,
};

use super::event_store::{generate_idempotency_key, Journal};
use super::gate::existing_outputs;
use super::pipeline::{Pipeline, Stage};

/// Runs every stage of a pipeline for a single project
#[derive(Debug, Clone)]
pub struct StageExecutor {
    journal: Journal,
}

impl StageExecutor {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }

    /// Execute the pipeline for one project, stopping at the first failure
    #[instrument(skip_all, fields(crate_name = %project.crate_name()))]
    pub async fn run(
        &self,
        project: &Project,
        paths: &DerivedPaths,
        pipeline: &Pipeline,
    ) -> ProjectRun {
        let crate_name = project.crate_name().as_str();
        info!(repo = %project.repo(), stages = pipeline.stages().len(), "Starting project");

        self.journal
            .record(
                Event::new(
                    self.journal.run_id(),
                    EventType::ProjectStarted,
                    format!("{}:{}:start", self.journal.run_id(), crate_name),
                    format!("Project '{}' from {}", crate_name, project.repo()),
                )
                .with_project(crate_name),
            )
            .await;

        let project_start = Instant::now();
        let mut results = Vec::with_capacity(pipeline.stages().len());

        for stage in pipeline.stages() {
            let result = self.run_stage(project, paths, stage).await;
            let failed = !result.is_success();
            results.push(result);

            if failed {
                break;
            }
        }

        let run = ProjectRun::from_results(project.clone(), results);
        let duration_ms = project_start.elapsed().as_millis() as u64;

        let event = match run.status {
            ProjectStatus::Failed => {
                let detail = run
                    .failure()
                    .and_then(|r| r.error_detail())
                    .unwrap_or_default();
                error!(stage = ?run.failed_at_stage, error = %detail, "Project failed");

                Event::new(
                    self.journal.run_id(),
                    EventType::ProjectFailed,
                    format!("{}:{}:complete", self.journal.run_id(), crate_name),
                    format!(
                        "Project '{}' failed at stage '{}'",
                        crate_name,
                        run.failed_at_stage.as_deref().unwrap_or_default()
                    ),
                )
                .with_error(detail)
            }
            _ => {
                info!(duration_ms, "Project completed successfully");

                Event::new(
                    self.journal.run_id(),
                    EventType::ProjectCompleted,
                    format!("{}:{}:complete", self.journal.run_id(), crate_name),
                    format!("Project '{}' completed", crate_name),
                )
            }
        };
        self.journal
            .record(event.with_project(crate_name).with_duration(duration_ms))
            .await;

        run
    }

    /// Execute a single stage, with retries for collaborator errors
    #[instrument(skip_all, fields(stage = %stage.name, index = stage.index))]
    async fn run_stage(&self, project: &Project, paths: &DerivedPaths, stage: &Stage) -> StageResult {
        let stage_start = Instant::now();
        let crate_name = project.crate_name().as_str();
        let run_id = self.journal.run_id();

        let inputs: Vec<PathBuf> = stage
            .inputs
            .iter()
            .map(|slot| paths.get(*slot).to_path_buf())
            .collect();
        let idem_key =
            generate_idempotency_key(run_id, crate_name, &stage.name, &fingerprint(project, &inputs));

        if stage.reuse_existing && stage.gate.inspects_outputs() && stage.gate.check(paths).is_ok() {
            info!("Outputs already present, reusing");
            let result = StageResult::success(
                &stage.name,
                stage.index,
                existing_outputs(&stage.outputs, paths),
                0,
                stage_start.elapsed().as_millis() as u64,
            )
            .into_reused();

            self.journal
                .record(
                    Event::new(
                        run_id,
                        EventType::StageCompleted,
                        idem_key,
                        format!("Stage '{}' reused existing outputs", stage.name),
                    )
                    .with_project(crate_name)
                    .with_stage(&stage.name),
                )
                .await;
            return result;
        }

        if let Err(e) = prepare_outputs(&stage.outputs, paths).await {
            let failure = StageFailure::collaborator(format!("failed to prepare output location: {}", e));
            return self
                .finish(project, paths, stage, idem_key, Err(failure), 0, stage_start)
                .await;
        }

        let request = CollaboratorRequest {
            stage: stage.name.clone(),
            project: project.clone(),
            paths: paths.clone(),
            inputs,
        };

        let mut attempt = 0u32;
        let invoked = loop {
            attempt += 1;

            self.journal
                .record(
                    Event::new(
                        run_id,
                        EventType::StageStarted,
                        idem_key.clone(),
                        format!("Stage '{}' attempt {}", stage.name, attempt),
                    )
                    .with_project(crate_name)
                    .with_stage(&stage.name)
                    .with_attempt(attempt),
                )
                .await;

            let failure = match invoke(stage, &request).await {
                Ok(()) => break Ok(()),
                Err(failure) => failure,
            };

            if failure.is_retryable() && stage.retry_policy.should_retry(attempt) {
                let delay = stage.retry_policy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "Stage failed, retrying"
                );

                self.journal
                    .record(
                        Event::new(
                            run_id,
                            EventType::StageRetrying,
                            format!("{}:retry:{}", idem_key, attempt),
                            format!("Stage '{}' failed, retrying in {:?}", stage.name, delay),
                        )
                        .with_project(crate_name)
                        .with_stage(&stage.name)
                        .with_attempt(attempt)
                        .with_error(failure.to_string()),
                    )
                    .await;

                clear_partial_outputs(stage, paths).await;
                tokio::time::sleep(delay).await;
                continue;
            }

            break Err(failure);
        };

        // A collaborator that claims success must still satisfy the gate
        let outcome = invoked.and_then(|()| stage.gate.check(paths).map_err(StageFailure::gate));

        self.finish(project, paths, stage, idem_key, outcome, attempt, stage_start)
            .await
    }

    /// Build the stage result and record its terminal event
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        project: &Project,
        paths: &DerivedPaths,
        stage: &Stage,
        idem_key: String,
        outcome: Result<(), StageFailure>,
        attempts: u32,
        stage_start: Instant,
    ) -> StageResult {
        let duration_ms = stage_start.elapsed().as_millis() as u64;
        let artifacts = existing_outputs(&stage.outputs, paths);
        let crate_name = project.crate_name().as_str();

        match outcome {
            Ok(()) => {
                debug!(duration_ms, ?artifacts, "Stage completed");

                self.journal
                    .record(
                        Event::new(
                            self.journal.run_id(),
                            EventType::StageCompleted,
                            idem_key,
                            format!("Stage '{}' completed in {}ms", stage.name, duration_ms),
                        )
                        .with_project(crate_name)
                        .with_stage(&stage.name)
                        .with_attempt(attempts)
                        .with_duration(duration_ms),
                    )
                    .await;

                StageResult::success(&stage.name, stage.index, artifacts, attempts, duration_ms)
            }
            Err(failure) => {
                error!(attempts, kind = ?failure.kind(), error = %failure, "Stage failed permanently");

                self.journal
                    .record(
                        Event::new(
                            self.journal.run_id(),
                            EventType::StageFailed,
                            idem_key,
                            format!(
                                "Stage '{}' failed after {} attempt(s)",
                                stage.name, attempts
                            ),
                        )
                        .with_project(crate_name)
                        .with_stage(&stage.name)
                        .with_attempt(attempts)
                        .with_duration(duration_ms)
                        .with_error(failure.to_string()),
                    )
                    .await;

                StageResult::failed(&stage.name, stage.index, failure, artifacts, attempts, duration_ms)
            }
        }
    }
}

/// Invoke the stage collaborator under the stage timeout.
///
/// Dropping the collaborator future on timeout kills any child process it
/// spawned.
async fn invoke(stage: &Stage, request: &CollaboratorRequest) -> Result<(), StageFailure> {
    match tokio::time::timeout(stage.timeout, stage.collaborator.invoke(request)).await {
        Err(_) => Err(StageFailure::TimedOut {
            timeout_ms: stage.timeout.as_millis() as u64,
        }),
        Ok(Err(e)) => Err(StageFailure::collaborator(format!("{:#}", e))),
        Ok(Ok(outcome)) if outcome.success => Ok(()),
        Ok(Ok(outcome)) => Err(StageFailure::collaborator(describe_failure(
            stage.collaborator.name(),
            &outcome,
        ))),
    }
}

fn describe_failure(name: &str, outcome: &CollaboratorOutcome) -> String {
    let status = match outcome.exit_code {
        Some(code) => format!("'{}' exited with code {}", name, code),
        None => format!("'{}' reported failure", name),
    };

    if outcome.diagnostics.is_empty() {
        status
    } else {
        format!("{}: {}", status, outcome.diagnostics)
    }
}

/// Create parent directories of declared outputs
async fn prepare_outputs(outputs: &[PathSlot], paths: &DerivedPaths) -> std::io::Result<()> {
    for slot in outputs {
        if let Some(parent) = paths.get(*slot).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Remove what a failed attempt left in the stage's own outputs.
///
/// Outputs that are also inputs were produced by an earlier stage and are
/// kept.
async fn clear_partial_outputs(stage: &Stage, paths: &DerivedPaths) {
    for slot in stage.outputs.iter().filter(|slot| !stage.inputs.contains(slot)) {
        let path = paths.get(*slot);
        let removed = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(_) => continue,
        };

        match removed {
            Ok(()) => debug!(path = %path.display(), "Cleared partial output before retry"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to clear partial output"),
        }
    }
}

/// Stable description of what a stage consumes
fn fingerprint(project: &Project, inputs: &[PathBuf]) -> String {
    let mut parts = vec![project.repo().to_string()];
    parts.extend(inputs.iter().map(|p| p.display().to_string()));
    parts.join("\n")
}
