//! Project descriptors: one migration unit each.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

use super::paths::legacy_name;

/// Name of the crate a project migrates into.
///
/// Guaranteed non-empty, free of path separators and of surrounding
/// whitespace, so it can be used as a single path component under the
/// workspace. Names are kept exactly as given, never normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CrateName(String);

impl CrateName {
    /// Validate and wrap a crate name
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();

        if name.is_empty()
            || name.trim() != name
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(ConfigError::InvalidCrateName { name });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CrateName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CrateName> for String {
    fn from(name: CrateName) -> Self {
        name.0
    }
}

impl AsRef<str> for CrateName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CrateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One migration unit: source repository in, crate out.
///
/// Constructed once by the config resolver and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    repo: String,
    workspace: PathBuf,
    #[serde(rename = "crate")]
    crate_name: CrateName,
    skip: bool,
    #[serde(skip)]
    legacy_name: String,
}

impl Project {
    /// Create a project, validating the repo and crate name
    pub fn new(
        repo: impl Into<String>,
        workspace: impl Into<PathBuf>,
        crate_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let repo = repo.into();
        if repo.trim().is_empty() {
            return Err(ConfigError::InvalidRepo {
                repo,
                reason: "repository location is empty".to_string(),
            });
        }
        if repo.trim() != repo {
            return Err(ConfigError::InvalidRepo {
                repo,
                reason: "leading or trailing whitespace".to_string(),
            });
        }

        let legacy_name = legacy_name(&repo)
            .ok_or_else(|| ConfigError::InvalidRepo {
                repo: repo.clone(),
                reason: "no directory name can be derived from it".to_string(),
            })?
            .to_string();

        Ok(Self {
            repo,
            workspace: workspace.into(),
            crate_name: CrateName::new(crate_name)?,
            skip: false,
            legacy_name,
        })
    }

    /// Mark the project as skipped (builder style)
    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn crate_name(&self) -> &CrateName {
        &self.crate_name
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    /// Directory name under `legacy/` this project's source is fetched into
    pub fn legacy_name(&self) -> &str {
        &self.legacy_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_name_validation() {
        assert!(CrateName::new("widget").is_ok());
        assert!(CrateName::new("widget_core-2").is_ok());

        assert!(matches!(
            CrateName::new(""),
            Err(ConfigError::InvalidCrateName { .. })
        ));
        assert!(CrateName::new("   ").is_err());
        assert!(CrateName::new("a/b").is_err());
        assert!(CrateName::new("a\\b").is_err());
        assert!(CrateName::new("..").is_err());
    }

    #[test]
    fn test_project_creation() {
        let project = Project::new("https://example.org/org/widget.git", "/tmp/ws", "widget")
            .unwrap();

        assert_eq!(project.repo(), "https://example.org/org/widget.git");
        assert_eq!(project.workspace(), Path::new("/tmp/ws"));
        assert_eq!(project.crate_name().as_str(), "widget");
        assert_eq!(project.legacy_name(), "widget");
        assert!(!project.skip());
        assert!(project.clone().with_skip(true).skip());
    }

    #[test]
    fn test_project_rejects_empty_repo() {
        let result = Project::new("  ", "/tmp/ws", "widget");
        assert!(matches!(result, Err(ConfigError::InvalidRepo { .. })));
    }

    #[test]
    fn test_surrounding_whitespace_rejected() {
        assert!(matches!(
            CrateName::new(" widget"),
            Err(ConfigError::InvalidCrateName { ref name }) if name == " widget"
        ));
        assert!(CrateName::new("widget\n").is_err());

        let result = Project::new("https://example.org/org/widget.git ", "/tmp/ws", "widget");
        assert!(matches!(result, Err(ConfigError::InvalidRepo { .. })));

        let result = Project::new("https://example.org/org/widget.git", "/tmp/ws", " widget");
        assert!(matches!(result, Err(ConfigError::InvalidCrateName { .. })));
    }

    #[test]
    fn test_crate_name_serde() {
        let name: CrateName = serde_json::from_str("\"widget\"").unwrap();
        assert_eq!(name.as_str(), "widget");

        let bad: Result<CrateName, _> = serde_json::from_str("\"../escape\"");
        assert!(bad.is_err());
    }
}
