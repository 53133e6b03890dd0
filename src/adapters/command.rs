//! Collaborator backed by an external command.
//!
//! The command is an argv template. Placeholders are substituted per stage
//! invocation with absolute paths, and the child runs with the workspace as
//! its working directory:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{repo}` | repository location |
//! | `{crate}` | crate name |
//! | `{workspace}` | workspace root |
//! | `{legacy}` | legacy source path |
//! | `{representation}` | representation document path |
//! | `{artifact}` | generated crate path |

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::anchored;

use super::{Collaborator, CollaboratorOutcome, CollaboratorRequest};

/// Lines of stderr kept for failure details
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Collaborator that spawns a subprocess
#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    name: String,
    argv: Vec<String>,
}

impl CommandCollaborator {
    /// Create a collaborator from an argv template
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
        }
    }

    /// Substitute placeholders for one invocation
    pub fn render(&self, request: &CollaboratorRequest) -> Vec<String> {
        let paths = &request.paths;
        let show = |path: &Path| anchored(path).display().to_string();
        let workspace = show(request.project.workspace());
        let legacy = show(&paths.legacy_source);
        let representation = show(&paths.representation);
        let artifact = show(&paths.artifact_output);

        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{repo}", request.project.repo())
                    .replace("{crate}", request.project.crate_name().as_str())
                    .replace("{workspace}", &workspace)
                    .replace("{legacy}", &legacy)
                    .replace("{representation}", &representation)
                    .replace("{artifact}", &artifact)
            })
            .collect()
    }
}

#[async_trait]
impl Collaborator for CommandCollaborator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &CollaboratorRequest) -> Result<CollaboratorOutcome> {
        let argv = self.render(request);
        let (program, args) = argv
            .split_first()
            .with_context(|| format!("Collaborator '{}' has an empty command", self.name))?;

        debug!(collaborator = %self.name, ?argv, "Spawning collaborator");

        let child = Command::new(program)
            .args(args)
            .current_dir(anchored(request.project.workspace()))
            .env("PORTWRIGHT_STAGE", &request.stage)
            .env("PORTWRIGHT_REPO", request.project.repo())
            .env("PORTWRIGHT_CRATE", request.project.crate_name().as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{}' for stage '{}'", program, request.stage))?;

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for '{}'", program))?;

        if output.status.success() {
            return Ok(CollaboratorOutcome::succeeded());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(CollaboratorOutcome::failed(
            output.status.code(),
            tail(&stderr, DIAGNOSTIC_TAIL_LINES),
        ))
    }
}

/// Keep the last `lines` lines of `text`
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
