//! Scenario discovery under the scenario root.
//!
//! Layout:
//!
//! ```text
//! scenarios/
//!   card_create/
//!     scenario.toml     (optional metadata)
//!     curl.tera
//!     python.tera
//!   debit_create/
//!     ...
//! ```

use std::path::{Path, PathBuf};

use super::metadata::ScenarioMetadata;
use super::ScenarioError;

const TEMPLATE_EXTENSION: &str = "tera";

/// A template file discovered for a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Full path to the template.
    pub path: PathBuf,
    /// Name the template is registered under in Tera (its file name).
    pub template_name: String,
    /// Language tag, taken from the file stem (`python.tera` → `python`).
    pub lang: String,
}

/// Root directory containing one subdirectory per scenario.
#[derive(Debug, Clone)]
pub struct ScenarioDir {
    root: PathBuf,
}

impl ScenarioDir {
    /// Open a scenario root; a missing directory is fatal.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ScenarioError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ScenarioError::MissingScenarioDir { path: root });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Names of every scenario directory holding at least one template, sorted.
    pub fn list(&self) -> Result<Vec<String>, ScenarioError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| ScenarioError::Io {
            path: self.root.clone(),
            source: e,
        })?;

        let mut names = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(?dir, "Skipping scenario directory with non UTF-8 name");
                continue;
            };
            if !scan_templates(&dir)?.is_empty() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Template files for a scenario, sorted by file name.
    pub fn templates(&self, name: &str) -> Result<Vec<TemplateFile>, ScenarioError> {
        let dir = self.checked_path(name)?;
        scan_templates(&dir)
    }

    pub fn metadata(&self, name: &str) -> Result<ScenarioMetadata, ScenarioError> {
        let dir = self.checked_path(name)?;
        Ok(ScenarioMetadata::load(&dir)?)
    }

    fn checked_path(&self, name: &str) -> Result<PathBuf, ScenarioError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ScenarioError::NotFound {
                name: name.to_string(),
                root: self.root.clone(),
            });
        }
        let dir = self.path_of(name);
        if !dir.is_dir() {
            return Err(ScenarioError::NotFound {
                name: name.to_string(),
                root: self.root.clone(),
            });
        }
        Ok(dir)
    }
}

fn scan_templates(dir: &Path) -> Result<Vec<TemplateFile>, ScenarioError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScenarioError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut templates = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION)
        {
            continue;
        }
        let (Some(template_name), Some(lang)) = (
            path.file_name().and_then(|n| n.to_str()).map(str::to_string),
            path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
        ) else {
            continue;
        };
        templates.push(TemplateFile {
            path,
            template_name,
            lang,
        });
    }
    templates.sort_by(|a, b| a.template_name.cmp(&b.template_name));
    Ok(templates)
}
