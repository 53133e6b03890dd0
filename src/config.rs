//! Configuration resolution.
//!
//! Turns raw invocation tokens into an ordered list of projects. Resolution
//! order (first match wins):
//! 1. First token ends in `.yaml`/`.yml` → explicit config file
//! 2. No tokens → default config file from the injected locator
//!    (`portwright.yaml` in the working directory)
//! 3. Exactly three positional tokens `<repo> <workspace> <crate>`
//!
//! Config files come in two shapes:
//!
//! ```yaml
//! # single project
//! repo: https://example.org/org/widget.git
//! workspace: /tmp/ws
//! crate: widget
//! ```
//!
//! ```yaml
//! # batch
//! workspace: /tmp/ws
//! projects:
//!   - repo: https://example.org/org/widget.git
//!     crate: widget
//!   - repo: https://example.org/org/gadget.git
//!     crate: gadget
//!     skip: true
//! ```
//!
//! Relative workspace paths in a config file resolve against the file's
//! directory and are made absolute. A positional workspace is kept as given. Either shape may carry a `settings` block
//! (see [`settings::PipelineSettings`]).

pub mod settings;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::core::pipeline::PipelineError;
use crate::domain::{anchored, Project};

use self::settings::PipelineSettings;

/// Default config file looked up when no arguments are given
pub const DEFAULT_CONFIG_FILE: &str = "portwright.yaml";

/// Extensions that mark a token as a config file path
pub const CONFIG_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Positional fields in order
const POSITIONAL_FIELDS: [&str; 3] = ["repo", "workspace", "crate"];

/// Configuration errors. Any of these aborts the run before a stage starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration: pass <repo> <workspace> <crate>, a config file, or create portwright.yaml")]
    MissingConfiguration,

    #[error("Missing required argument '{field}' (usage: run <repo> <workspace> <crate>)")]
    MissingArgument { field: &'static str },

    #[error("Unexpected extra argument '{value}' (usage: run <repo> <workspace> <crate>)")]
    ExtraArgument { value: String },

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Config document matches neither the single-project shape (repo, workspace, crate) nor the batch shape (workspace, projects): {reason}")]
    UnrecognizedShape { reason: String },

    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Invalid crate name '{name}': must be non-empty, without surrounding whitespace or path separators")]
    InvalidCrateName { name: String },

    #[error("Invalid repository '{repo}': {reason}")]
    InvalidRepo { repo: String, reason: String },

    #[error("Crate '{crate_name}' is produced by both projects[{first}] and projects[{second}]")]
    DuplicateCrate {
        crate_name: String,
        first: usize,
        second: usize,
    },

    #[error("projects[{first}] and projects[{second}] fetch different repositories into legacy/{name}")]
    LegacyCollision {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("projects[{index}]: {source}")]
    InEntry {
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ConfigError {
    fn in_entry(index: usize) -> impl FnOnce(ConfigError) -> ConfigError {
        move |source| ConfigError::InEntry {
            index,
            source: Box::new(source),
        }
    }
}

/// Supplies the default config file when no arguments are given
pub trait DefaultConfigLocator {
    /// Path of the default config file, if one exists
    fn locate(&self) -> Option<PathBuf>;
}

/// Looks for [`DEFAULT_CONFIG_FILE`] in a fixed directory
#[derive(Debug, Clone)]
pub struct WorkingDirLocator {
    dir: PathBuf,
}

impl WorkingDirLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DefaultConfigLocator for WorkingDirLocator {
    fn locate(&self) -> Option<PathBuf> {
        let candidate = self.dir.join(DEFAULT_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    }
}

/// Locator that never finds a default config
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaultConfig;

impl DefaultConfigLocator for NoDefaultConfig {
    fn locate(&self) -> Option<PathBuf> {
        None
    }
}

/// Where the projects came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Positional,
    File(PathBuf),
}

/// Fully resolved invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub source: ConfigSource,

    /// Workspace root shared by all projects
    pub workspace: PathBuf,

    /// Projects in input order
    pub projects: Vec<Project>,

    pub settings: PipelineSettings,
}

/// Resolve invocation tokens into projects
pub fn resolve(
    tokens: &[String],
    locator: &dyn DefaultConfigLocator,
) -> Result<Invocation, ConfigError> {
    if let Some(first) = tokens.first() {
        if is_config_path(first) {
            if let Some(extra) = tokens.get(1) {
                return Err(ConfigError::ExtraArgument {
                    value: extra.clone(),
                });
            }
            return load_config_file(Path::new(first));
        }
    } else {
        let path = locator.locate().ok_or(ConfigError::MissingConfiguration)?;
        debug!(path = %path.display(), "Using default config file");
        return load_config_file(&path);
    }

    resolve_positional(tokens)
}

/// Whether a token names a config file by its extension
pub fn is_config_path(token: &str) -> bool {
    Path::new(token)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            CONFIG_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn resolve_positional(tokens: &[String]) -> Result<Invocation, ConfigError> {
    if tokens.len() < POSITIONAL_FIELDS.len() {
        return Err(ConfigError::MissingArgument {
            field: POSITIONAL_FIELDS[tokens.len()],
        });
    }
    if let Some(extra) = tokens.get(POSITIONAL_FIELDS.len()) {
        return Err(ConfigError::ExtraArgument {
            value: extra.clone(),
        });
    }

    let workspace = PathBuf::from(&tokens[1]);
    let project = Project::new(tokens[0].as_str(), workspace.clone(), tokens[2].as_str())?;

    Ok(Invocation {
        source: ConfigSource::Positional,
        workspace,
        projects: vec![project],
        settings: PipelineSettings::default(),
    })
}

/// Read and parse a config file
pub fn load_config_file(path: &Path) -> Result<Invocation, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let (workspace, projects, settings) = parse_document(&content, base_dir).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })?;

    Ok(Invocation {
        source: ConfigSource::File(path.to_path_buf()),
        workspace,
        projects,
        settings,
    })
}

/// Raw config document; every field optional so shape errors can name the
/// offending field instead of failing inside serde
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    repo: Option<String>,
    workspace: Option<PathBuf>,
    #[serde(rename = "crate")]
    crate_name: Option<String>,
    projects: Option<Vec<RawEntry>>,
    #[serde(default)]
    settings: PipelineSettings,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    repo: Option<String>,
    #[serde(rename = "crate")]
    crate_name: Option<String>,
    #[serde(default)]
    skip: bool,
}

/// Parse a config document, resolving a relative workspace against `base_dir`
pub fn parse_document(
    content: &str,
    base_dir: &Path,
) -> Result<(PathBuf, Vec<Project>, PipelineSettings), ConfigError> {
    if content.trim().is_empty() {
        return Err(ConfigError::UnrecognizedShape {
            reason: "document is empty".to_string(),
        });
    }

    let raw: RawDocument = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
        path: PathBuf::new(),
        message: e.to_string(),
    })?;

    raw.settings.validate()?;

    let workspace = raw
        .workspace
        .as_deref()
        .map(|w| resolve_path(base_dir, w))
        .ok_or(ConfigError::MissingField { field: "workspace" });

    let projects = match (raw.projects, raw.repo, raw.crate_name) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            return Err(ConfigError::UnrecognizedShape {
                reason: "top-level 'repo'/'crate' cannot be combined with 'projects'".to_string(),
            })
        }
        (Some(entries), None, None) => {
            let workspace = workspace?;
            let projects = entries
                .into_iter()
                .enumerate()
                .map(|(index, entry)| build_entry(entry, &workspace).map_err(ConfigError::in_entry(index)))
                .collect::<Result<Vec<_>, _>>()?;
            check_disjoint(&projects)?;
            return Ok((workspace, projects, raw.settings));
        }
        (None, None, None) => {
            return Err(ConfigError::UnrecognizedShape {
                reason: "expected 'repo' and 'crate', or a 'projects' list".to_string(),
            })
        }
        (None, repo, crate_name) => {
            let repo = repo.ok_or(ConfigError::MissingField { field: "repo" })?;
            let workspace = workspace?;
            let crate_name = crate_name.ok_or(ConfigError::MissingField { field: "crate" })?;
            vec![Project::new(repo, workspace, crate_name)?]
        }
    };

    let workspace = projects[0].workspace().to_path_buf();
    Ok((workspace, projects, raw.settings))
}

fn build_entry(entry: RawEntry, workspace: &Path) -> Result<Project, ConfigError> {
    let repo = entry.repo.ok_or(ConfigError::MissingField { field: "repo" })?;
    let crate_name = entry
        .crate_name
        .ok_or(ConfigError::MissingField { field: "crate" })?;

    Ok(Project::new(repo, workspace, crate_name)?.with_skip(entry.skip))
}

/// Non-skipped projects sharing a workspace must write disjoint subtrees
fn check_disjoint(projects: &[Project]) -> Result<(), ConfigError> {
    let mut crates: HashMap<&str, usize> = HashMap::new();
    let mut legacy: HashMap<&str, (usize, &str)> = HashMap::new();

    for (index, project) in projects.iter().enumerate().filter(|(_, p)| !p.skip()) {
        let crate_name = project.crate_name().as_str();
        if let Some(&first) = crates.get(crate_name) {
            return Err(ConfigError::DuplicateCrate {
                crate_name: crate_name.to_string(),
                first,
                second: index,
            });
        }
        crates.insert(crate_name, index);

        match legacy.get(project.legacy_name()) {
            Some(&(first, repo)) if repo != project.repo() => {
                return Err(ConfigError::LegacyCollision {
                    name: project.legacy_name().to_string(),
                    first,
                    second: index,
                });
            }
            Some(_) => {}
            None => {
                legacy.insert(project.legacy_name(), (index, project.repo()));
            }
        }
    }

    Ok(())
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        anchored(&base.join(path))
    }
}
