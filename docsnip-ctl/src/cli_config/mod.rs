//! CLI configuration: scenario locations, API target and interpreter overrides.
//!
//! Every key is optional; command-line flags take precedence over the file and
//! the file over built-in defaults.

pub(crate) mod loader;

pub(crate) use loader::{expand_path, load_cli_config};

use std::collections::BTreeMap;

use docsnip_sdk::bootstrap::EscrowPolicy;
use serde::Deserialize;

pub(crate) const DEFAULT_SCENARIO_DIR: &str = "scenarios";
pub(crate) const DEFAULT_CACHE_PATH: &str = ".docsnip/cache.json";
pub(crate) const DEFAULT_ROUTES_PATH: &str = "routes.toml";
pub(crate) const DEFAULT_WORKSPACE_DIR: &str = ".docsnip/workspace";
pub(crate) const DEFAULT_API_LOCATION: &str = "http://localhost:5000";

fn default_threshold() -> u64 {
    EscrowPolicy::default().threshold
}

fn default_increment() -> u64 {
    EscrowPolicy::default().increment
}

/// Escrow balance guaranteed before scenarios run, in cents.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct EscrowConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    #[serde(default = "default_increment")]
    pub increment: u64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            increment: default_increment(),
        }
    }
}

impl From<EscrowConfig> for EscrowPolicy {
    fn from(config: EscrowConfig) -> Self {
        Self {
            threshold: config.threshold,
            increment: config.increment,
        }
    }
}

/// Contents of `.docsnip.toml`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CliConfig {
    /// Directory holding one subdirectory per scenario.
    pub scenario_dir: Option<String>,

    /// Scenario cache file.
    pub cache_path: Option<String>,

    /// Routing table used by `route` and `url_for`.
    pub routes_path: Option<String>,

    /// Scratch directory for per-language scripts.
    pub workspace_dir: Option<String>,

    /// Payments API base URL.
    pub api_location: Option<String>,

    /// Language executed besides curl.
    pub execute_lang: Option<String>,

    /// Languages skipped for every scenario.
    #[serde(default)]
    pub disabled_languages: Vec<String>,

    #[serde(default)]
    pub escrow: EscrowConfig,

    /// Language → interpreter command (e.g. `python = "python3 -u"`).
    #[serde(default)]
    pub interpreters: BTreeMap<String, String>,
}

impl CliConfig {
    pub(crate) fn scenario_dir(&self) -> std::path::PathBuf {
        expand_path(self.scenario_dir.as_deref().unwrap_or(DEFAULT_SCENARIO_DIR))
    }

    pub(crate) fn cache_path(&self) -> std::path::PathBuf {
        expand_path(self.cache_path.as_deref().unwrap_or(DEFAULT_CACHE_PATH))
    }
}
