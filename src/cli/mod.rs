//! Command-line interface for portwright.
//!
//! Provides commands for running migrations, checking configuration,
//! printing derived paths and inspecting past runs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use uuid::Uuid;

use crate::config::{self, ConfigError, Invocation, WorkingDirLocator};
use crate::core::report::{EXIT_CONFIGURATION, EXIT_SUCCESS};
use crate::core::{summarize, BatchRunner, EventStore, Journal, Pipeline};
use crate::domain::derive;

/// portwright - Multi-stage migration pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "portwright")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the migration pipeline
    ///
    /// Accepts `<repo> <workspace> <crate>`, a config file path, or nothing
    /// (reads ./portwright.yaml).
    Run {
        /// Positional arguments or a config file path
        tokens: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Do not write a run log under <workspace>/.portwright
        #[arg(long)]
        no_log: bool,
    },

    /// Resolve configuration and list projects without running anything
    Check {
        /// Positional arguments or a config file path
        tokens: Vec<String>,
    },

    /// Print the paths derived for a project
    Paths {
        repo: String,
        workspace: PathBuf,
        #[arg(value_name = "CRATE")]
        crate_name: String,
    },

    /// List runs recorded in a workspace
    Runs {
        workspace: PathBuf,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the event log of a run
    Status { workspace: PathBuf, run_id: String },
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub async fn execute(self) -> Result<i32> {
        match self.command {
            Commands::Run {
                tokens,
                json,
                no_log,
            } => run(&tokens, json, no_log).await,
            Commands::Check { tokens } => check(&tokens),
            Commands::Paths {
                repo,
                workspace,
                crate_name,
            } => show_paths(&repo, &workspace, &crate_name),
            Commands::Runs { workspace, limit } => list_runs(&workspace, limit).await,
            Commands::Status { workspace, run_id } => show_status(&workspace, &run_id).await,
        }
    }
}

/// Resolve tokens against the current directory's default config
fn resolve_tokens(tokens: &[String]) -> Result<std::result::Result<Invocation, ConfigError>> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    Ok(config::resolve(tokens, &WorkingDirLocator::new(cwd)))
}

fn report_config_error(e: &ConfigError) -> i32 {
    error!(error = %e, "Configuration error");
    eprintln!("configuration error: {}", e);
    EXIT_CONFIGURATION
}

/// Run the pipeline over every resolved project
async fn run(tokens: &[String], json: bool, no_log: bool) -> Result<i32> {
    let invocation = match resolve_tokens(tokens)? {
        Ok(invocation) => invocation,
        Err(e) => return Ok(report_config_error(&e)),
    };

    let pipeline = match Pipeline::standard(&invocation.settings) {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(report_config_error(&ConfigError::from(e))),
    };

    let run_id = Uuid::new_v4();
    let journal = if no_log {
        Journal::disabled(run_id)
    } else {
        Journal::new(run_id, EventStore::open(&invocation.workspace, run_id).await?)
    };

    let batch = BatchRunner::new(journal)
        .run_all(&invocation.projects, &pipeline)
        .await;
    let report = summarize(&batch);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        println!("{}", report);
    }

    Ok(report.exit_code())
}

/// Show what a run would do
fn check(tokens: &[String]) -> Result<i32> {
    let invocation = match resolve_tokens(tokens)? {
        Ok(invocation) => invocation,
        Err(e) => return Ok(report_config_error(&e)),
    };

    let pipeline = match Pipeline::standard(&invocation.settings) {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(report_config_error(&ConfigError::from(e))),
    };

    match &invocation.source {
        config::ConfigSource::Positional => println!("Source: positional arguments"),
        config::ConfigSource::File(path) => println!("Source: {}", path.display()),
    }
    println!("Workspace: {}", invocation.workspace.display());
    println!();

    println!("Stages:");
    for stage in pipeline.stages() {
        println!(
            "  {}. {:<10} timeout {}s, max attempts {}",
            stage.index,
            stage.name,
            stage.timeout.as_secs(),
            stage.retry_policy.max_attempts
        );
    }
    println!();

    println!("{:<24} {:<8} {}", "CRATE", "SKIP", "REPO");
    println!("{}", "-".repeat(80));
    for project in &invocation.projects {
        println!(
            "{:<24} {:<8} {}",
            project.crate_name().as_str(),
            if project.skip() { "yes" } else { "no" },
            project.repo()
        );
    }

    Ok(EXIT_SUCCESS)
}

/// Print the derived paths for a project
fn show_paths(repo: &str, workspace: &std::path::Path, crate_name: &str) -> Result<i32> {
    let paths = match derive(workspace, crate_name, repo) {
        Ok(paths) => paths,
        Err(e) => return Ok(report_config_error(&e)),
    };

    println!("legacy:         {}", paths.legacy_source.display());
    println!("representation: {}", paths.representation.display());
    println!("artifact:       {}", paths.artifact_output.display());

    Ok(EXIT_SUCCESS)
}

/// List runs recorded in a workspace, most recent first
async fn list_runs(workspace: &std::path::Path, limit: usize) -> Result<i32> {
    let mut runs = Vec::new();
    for run_id in EventStore::list_runs(workspace).await? {
        let store = EventStore::open(workspace, run_id).await?;
        let events = store.replay().await?;
        if let Some(first) = events.first() {
            let summary = events
                .last()
                .map(|e| e.payload_summary.clone())
                .unwrap_or_default();
            runs.push((first.timestamp, run_id, summary));
        }
    }

    if runs.is_empty() {
        println!("No runs found");
        return Ok(EXIT_SUCCESS);
    }

    runs.sort_by(|a, b| b.0.cmp(&a.0));

    println!("{:<38} {:<26} {}", "RUN ID", "STARTED", "LAST EVENT");
    println!("{}", "-".repeat(90));
    for (started, run_id, summary) in runs.into_iter().take(limit) {
        println!(
            "{:<38} {:<26} {}",
            run_id,
            started.format("%Y-%m-%d %H:%M:%S UTC"),
            summary
        );
    }

    Ok(EXIT_SUCCESS)
}

/// Replay and print the event log of one run
async fn show_status(workspace: &std::path::Path, run_id_str: &str) -> Result<i32> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    if !EventStore::base_directory(workspace)
        .join(run_id.to_string())
        .exists()
    {
        anyhow::bail!("Run {} not found in {}", run_id, workspace.display());
    }

    let store = EventStore::open(workspace, run_id).await?;
    let events = store.replay().await?;

    println!("Run ID: {}", run_id);
    println!("Log: {}", store.events_path().display());
    println!();

    for event in events {
        let scope = match (&event.project, &event.stage) {
            (Some(project), Some(stage)) => format!("{}/{}", project, stage),
            (Some(project), None) => project.clone(),
            _ => "-".to_string(),
        };
        println!(
            "{} {:<18} {:<24} {}",
            event.timestamp.format("%H:%M:%S"),
            format!("{:?}", event.event_type),
            scope,
            event.payload_summary
        );
        if let Some(error) = &event.error {
            println!("{:>10}error: {}", "", error);
        }
    }

    Ok(EXIT_SUCCESS)
}
