//! Validation gates over stage outputs.
//!
//! A gate inspects the filesystem after a collaborator reports success. It
//! never trusts the collaborator's word alone.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::domain::{DerivedPaths, PathSlot};

use super::pipeline::Gate;

impl Gate {
    /// Check the gate against the project's paths, returning the reason it
    /// does not hold
    pub fn check(&self, paths: &DerivedPaths) -> Result<(), String> {
        match self {
            Gate::NonEmptyDir(slot) => non_empty_dir(paths.get(*slot)),
            Gate::NonEmptyFile(slot) => non_empty_file(paths.get(*slot)),
            Gate::RequiredFiles { root, patterns } => {
                required_files(paths.get(*root), patterns)
            }
            Gate::SuccessSignal => Ok(()),
        }
    }

    /// Whether the gate inspects any output at all
    pub fn inspects_outputs(&self) -> bool {
        !matches!(self, Gate::SuccessSignal)
    }
}

fn non_empty_dir(path: &Path) -> Result<(), String> {
    let mut entries = fs::read_dir(path)
        .map_err(|e| format!("expected directory {} ({})", path.display(), e))?;

    if entries.next().is_none() {
        return Err(format!("directory {} is empty", path.display()));
    }
    Ok(())
}

fn non_empty_file(path: &Path) -> Result<(), String> {
    let metadata = fs::metadata(path)
        .map_err(|e| format!("expected file {} ({})", path.display(), e))?;

    if !metadata.is_file() {
        return Err(format!("{} is not a file", path.display()));
    }
    if metadata.len() == 0 {
        return Err(format!("file {} is empty", path.display()));
    }
    Ok(())
}

fn required_files(root: &Path, patterns: &[String]) -> Result<(), String> {
    if !root.is_dir() {
        return Err(format!("expected directory {}", root.display()));
    }

    let missing: Vec<&str> = patterns
        .iter()
        .filter(|pattern| matching_files(root, pattern).is_empty())
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "no files in {} match: {}",
            root.display(),
            missing.join(", ")
        ))
    }
}

/// Files under `root` matching a relative glob pattern
pub fn matching_files(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = format!(
        "{}/{}",
        Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches('/')
    );

    match glob::glob(&full) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Declared outputs that currently exist, in declaration order
pub fn existing_outputs(outputs: &[PathSlot], paths: &DerivedPaths) -> Vec<PathBuf> {
    let mut existing: Vec<PathBuf> = Vec::new();
    for slot in outputs {
        let path = paths.get(*slot);
        if path.exists() && !existing.iter().any(|p| p == path) {
            existing.push(path.to_path_buf());
        }
    }
    existing
}
