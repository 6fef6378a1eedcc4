//! Scenario metadata parsing (`scenario.toml`).

use std::path::Path;

use serde::Deserialize;

const METADATA_FILENAME: &str = "scenario.toml";

/// Optional per-scenario metadata, parsed from `scenario.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioMetadata {
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,

    /// Scenarios whose cached responses this one reads through `deps`.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Request payload exposed to templates as `payload`.
    #[serde(default)]
    pub payload: Option<toml::Table>,

    /// Languages this scenario cannot be rendered for.
    #[serde(default)]
    pub disabled_languages: Vec<String>,
}

impl ScenarioMetadata {
    /// Load metadata from a scenario directory; a missing file yields defaults.
    pub fn load(scenario_dir: &Path) -> Result<Self, MetadataError> {
        let path = scenario_dir.join(METADATA_FILENAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| MetadataError::Io {
            path: path.clone(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| MetadataError::Parse { path, source: e })
    }

    /// Payload as a JSON value for the template context (`null` when absent).
    pub fn payload_value(&self) -> serde_json::Value {
        self.payload
            .as_ref()
            .and_then(|table| serde_json::to_value(table).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn is_disabled_for(&self, lang: &str) -> bool {
        self.disabled_languages.iter().any(|l| l == lang)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read {path}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },
}
