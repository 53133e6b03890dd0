//! Deterministic workspace layout for a project.
//!
//! Every project owns a disjoint subtree of the workspace:
//!
//! | Path | Contents |
//! |------|----------|
//! | `legacy/<repo-name>` | fetched source repository |
//! | `ir/<crate>.ir.md` | extracted representation document |
//! | `crates/<crate>` | generated crate |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

use super::project::{CrateName, Project};

/// Subdirectory holding fetched source repositories
pub const LEGACY_DIR: &str = "legacy";

/// Subdirectory holding representation documents
pub const REPRESENTATION_DIR: &str = "ir";

/// Subdirectory holding generated crates
pub const CRATES_DIR: &str = "crates";

/// Suffix of a representation document
pub const REPRESENTATION_SUFFIX: &str = ".ir.md";

/// Archive suffix stripped from repository names
const ARCHIVE_SUFFIX: &str = ".git";

/// Filesystem locations the stages of one project read and write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedPaths {
    pub legacy_source: PathBuf,
    pub representation: PathBuf,
    pub artifact_output: PathBuf,
}

/// Named slot in [`DerivedPaths`], used by stage declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSlot {
    LegacySource,
    Representation,
    ArtifactOutput,
}

impl PathSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LegacySource => "legacy",
            Self::Representation => "representation",
            Self::ArtifactOutput => "artifact",
        }
    }
}

impl DerivedPaths {
    /// Paths for an already validated project
    pub fn for_project(project: &Project) -> Self {
        Self::build(
            project.workspace(),
            project.crate_name(),
            project.legacy_name(),
        )
    }

    fn build(workspace: &Path, crate_name: &CrateName, legacy_name: &str) -> Self {
        Self {
            legacy_source: workspace.join(LEGACY_DIR).join(legacy_name),
            representation: workspace
                .join(REPRESENTATION_DIR)
                .join(format!("{}{}", crate_name, REPRESENTATION_SUFFIX)),
            artifact_output: workspace.join(CRATES_DIR).join(crate_name.as_str()),
        }
    }

    /// Look up the path bound to a slot
    pub fn get(&self, slot: PathSlot) -> &Path {
        match slot {
            PathSlot::LegacySource => &self.legacy_source,
            PathSlot::Representation => &self.representation,
            PathSlot::ArtifactOutput => &self.artifact_output,
        }
    }
}

/// Derive the paths for `(workspace, crate, repo)`.
///
/// Pure: the same inputs always give the same paths, and two distinct crate
/// names never share a representation or artifact path.
pub fn derive(workspace: &Path, crate_name: &str, repo: &str) -> Result<DerivedPaths, ConfigError> {
    let crate_name = CrateName::new(crate_name)?;
    let legacy = legacy_name(repo).ok_or_else(|| ConfigError::InvalidRepo {
        repo: repo.to_string(),
        reason: "no directory name can be derived from it".to_string(),
    })?;

    Ok(DerivedPaths::build(workspace, &crate_name, legacy))
}

/// Extract the directory name for a repository location.
///
/// Takes the last path segment (trailing separators ignored, `host:path`
/// scp-style remotes supported) and strips a trailing `.git`.
pub fn legacy_name(repo: &str) -> Option<&str> {
    let trimmed = repo.trim().trim_end_matches(['/', '\\']);
    let segment = trimmed.rsplit(['/', '\\', ':']).next()?;
    let name = segment.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(segment);

    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Anchor a relative path at the process working directory
pub fn anchored(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
