//! Run summaries.
//!
//! A report lists every project exactly once, with the failing stage and
//! its detail for failed projects, plus run totals.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{BatchRun, FailureKind, ProjectStatus};

/// Every project succeeded or was skipped
pub const EXIT_SUCCESS: i32 = 0;

/// At least one project failed
pub const EXIT_PROJECT_FAILED: i32 = 1;

/// Configuration could not be resolved; nothing ran
pub const EXIT_CONFIGURATION: i32 = 2;

/// Unexpected orchestrator error
pub const EXIT_INTERNAL: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub projects: Vec<ProjectSummary>,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub repo: String,
    #[serde(rename = "crate")]
    pub crate_name: String,
    pub status: ProjectStatus,
    pub failed_stage: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,

    /// Projects that entered the executor (succeeded + failed)
    pub attempted: usize,
}

/// Summarize a batch run
pub fn summarize(batch: &BatchRun) -> Report {
    let mut totals = Totals::default();

    let projects = batch
        .projects
        .iter()
        .map(|run| {
            match run.status {
                ProjectStatus::Success => totals.succeeded += 1,
                ProjectStatus::Failed => totals.failed += 1,
                ProjectStatus::Skipped => totals.skipped += 1,
            }

            let failure = run.failure().and_then(|r| r.error.as_ref());
            ProjectSummary {
                repo: run.project.repo().to_string(),
                crate_name: run.project.crate_name().to_string(),
                status: run.status,
                failed_stage: run.failed_at_stage.clone(),
                failure_kind: failure.map(|f| f.kind()),
                error_detail: failure.map(ToString::to_string),
            }
        })
        .collect();

    totals.attempted = totals.succeeded + totals.failed;

    Report {
        run_id: batch.run_id,
        projects,
        totals,
    }
}

impl Report {
    /// Process exit code for this report
    pub fn exit_code(&self) -> i32 {
        if self.totals.failed > 0 {
            EXIT_PROJECT_FAILED
        } else {
            EXIT_SUCCESS
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(f, "{:<24} {:<10} {:<12} {}", "CRATE", "STATUS", "STAGE", "REPO")?;
        writeln!(f, "{}", "-".repeat(80))?;

        for project in &self.projects {
            writeln!(
                f,
                "{:<24} {:<10} {:<12} {}",
                project.crate_name,
                project.status.to_string(),
                project.failed_stage.as_deref().unwrap_or("-"),
                project.repo
            )?;
            if let Some(detail) = &project.error_detail {
                for line in detail.lines() {
                    writeln!(f, "    {}", line)?;
                }
            }
        }

        writeln!(f)?;
        write!(
            f,
            "Total: {} attempted, {} succeeded, {} failed, {} skipped",
            self.totals.attempted, self.totals.succeeded, self.totals.failed, self.totals.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Project, ProjectRun, StageFailure, StageResult};

    fn project(name: &str) -> Project {
        Project::new(format!("https://x/{}.git", name), "/ws", name).unwrap()
    }

    fn batch() -> BatchRun {
        let mut batch = BatchRun::new(Uuid::new_v4());
        batch.projects = vec![
            ProjectRun::from_results(
                project("alpha"),
                vec![StageResult::success("fetch", 1, vec![], 1, 5)],
            ),
            ProjectRun::skipped(project("beta").with_skip(true)),
            ProjectRun::from_results(
                project("gamma"),
                vec![
                    StageResult::success("fetch", 1, vec![], 1, 5),
                    StageResult::failed(
                        "extract",
                        2,
                        StageFailure::gate("file /ws/ir/gamma.ir.md is empty"),
                        vec![],
                        1,
                        5,
                    ),
                ],
            ),
        ];
        batch
    }

    #[test]
    fn test_summarize_totals() {
        let report = summarize(&batch());

        assert_eq!(
            report.totals,
            Totals {
                succeeded: 1,
                failed: 1,
                skipped: 1,
                attempted: 2,
            }
        );
        assert_eq!(report.exit_code(), EXIT_PROJECT_FAILED);
    }

    #[test]
    fn test_summarize_preserves_order_and_failure() {
        let report = summarize(&batch());

        let names: Vec<&str> = report.projects.iter().map(|p| p.crate_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);

        let gamma = &report.projects[2];
        assert_eq!(gamma.status, ProjectStatus::Failed);
        assert_eq!(gamma.failed_stage.as_deref(), Some("extract"));
        assert_eq!(gamma.failure_kind, Some(FailureKind::ValidationGateFailure));
        assert_eq!(
            gamma.error_detail.as_deref(),
            Some("output validation failed: file /ws/ir/gamma.ir.md is empty")
        );

        let beta = &report.projects[1];
        assert_eq!(beta.status, ProjectStatus::Skipped);
        assert!(beta.failed_stage.is_none());
    }

    #[test]
    fn test_empty_batch_succeeds() {
        let report = summarize(&BatchRun::new(Uuid::new_v4()));
        assert_eq!(report.totals, Totals::default());
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
    }

    #[test]
    fn test_render_table() {
        let text = summarize(&batch()).to_string();

        assert!(text.contains("gamma"));
        assert!(text.contains("extract"));
        assert!(text.contains("output validation failed"));
        assert!(text.ends_with("Total: 2 attempted, 1 succeeded, 1 failed, 1 skipped"));
    }

    #[test]
    fn test_json_uses_crate_key() {
        let json = serde_json::to_value(summarize(&batch())).unwrap();
        assert_eq!(json["projects"][0]["crate"], "alpha");
        assert_eq!(json["projects"][2]["failure_kind"], "validation_gate_failure");
        assert_eq!(json["totals"]["attempted"], 2);
    }
}
