//! Shared fixtures: scripted in-process collaborators wired into the
//! standard pipeline layout.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use portwright::adapters::{Collaborator, CollaboratorOutcome, CollaboratorRequest};
use portwright::config::settings::PipelineSettings;
use portwright::core::pipeline::{EXTRACT, FETCH, GENERATE, STANDARD_STAGES, TESTS};
use portwright::core::{Pipeline, RetryPolicy};

/// What a scripted collaborator does on each call (attempt is 1-based)
pub type Action =
    Arc<dyn Fn(&CollaboratorRequest, usize) -> Result<CollaboratorOutcome> + Send + Sync>;

/// Box a closure as an [`Action`]
pub fn action<F>(f: F) -> Action
where
    F: Fn(&CollaboratorRequest, usize) -> Result<CollaboratorOutcome> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub struct Scripted {
    name: String,
    calls: AtomicUsize,
    delay: Option<Duration>,
    action: Action,
}

impl Scripted {
    pub fn new(name: &str, action: Action) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            delay: None,
            action,
        })
    }

    /// Sleeps before acting, for timeout tests
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
            action: action(|_, _| Ok(CollaboratorOutcome::succeeded())),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collaborator for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &CollaboratorRequest) -> Result<CollaboratorOutcome> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.action)(request, attempt)
    }
}

pub fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// A collaborator that produces exactly what its stage's gate expects
pub fn well_behaved(stage: &str) -> Arc<Scripted> {
    let script: Action = match stage {
        FETCH => action(|req, _| {
            write(&req.paths.legacy_source.join("main.c"), "int main(void) { return 0; }\n")?;
            Ok(CollaboratorOutcome::succeeded())
        }),
        EXTRACT => action(|req, _| {
            write(&req.paths.representation, "# widget\n\nentry point: main\n")?;
            Ok(CollaboratorOutcome::succeeded())
        }),
        GENERATE => action(|req, _| {
            let root = &req.paths.artifact_output;
            write(&root.join("Cargo.toml"), "[package]\nname = \"widget\"\n")?;
            write(&root.join("src/lib.rs"), "pub fn main() {}\n")?;
            Ok(CollaboratorOutcome::succeeded())
        }),
        TESTS => action(|req, _| {
            write(
                &req.paths.artifact_output.join("tests/smoke.rs"),
                "#[test]\nfn smoke() {}\n",
            )?;
            Ok(CollaboratorOutcome::succeeded())
        }),
        _ => action(|_, _| Ok(CollaboratorOutcome::succeeded())),
    };
    Scripted::new(stage, script)
}

/// Reports success without touching the filesystem
pub fn silent(stage: &str) -> Arc<Scripted> {
    Scripted::new(stage, action(|_, _| Ok(CollaboratorOutcome::succeeded())))
}

/// Exits non-zero with a diagnostic
pub fn failing(stage: &str, diagnostics: &'static str) -> Arc<Scripted> {
    Scripted::new(
        stage,
        action(move |_, _| Ok(CollaboratorOutcome::failed(Some(1), diagnostics))),
    )
}

/// Five well-behaved collaborators in stage order
pub fn well_behaved_set() -> Vec<Arc<Scripted>> {
    STANDARD_STAGES.iter().map(|s| well_behaved(s)).collect()
}

/// The standard pipeline with its collaborators replaced
pub fn pipeline(collaborators: &[Arc<Scripted>]) -> Pipeline {
    build(collaborators, |_| {})
}

/// The standard pipeline with collaborators replaced and every stage adjusted
pub fn build(
    collaborators: &[Arc<Scripted>],
    adjust: impl Fn(&mut portwright::core::Stage),
) -> Pipeline {
    let standard = Pipeline::standard(&PipelineSettings::default()).unwrap();
    let stages = standard
        .stages()
        .iter()
        .zip(collaborators)
        .map(|(stage, collaborator)| {
            let mut stage = stage.clone();
            stage.collaborator = collaborator.clone();
            adjust(&mut stage);
            stage
        })
        .collect();
    Pipeline::new(stages).unwrap()
}

/// Up to `max_attempts` tries with a negligible delay
pub fn quick_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        ..Default::default()
    }
}
