//! Config file discovery and loading for `.docsnip.toml`.
//!
//! An explicit `--config` path is used as given. Otherwise two locations are
//! checked in precedence order:
//! 1. `./.docsnip.toml` (project-local)
//! 2. `~/.config/docsnip.toml` (user-global)

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::CliConfig;

const CONFIG_FILENAME: &str = ".docsnip.toml";
const GLOBAL_CONFIG_DIR: &str = ".config";
const GLOBAL_CONFIG_FILENAME: &str = "docsnip.toml";

/// Load CLI config.
///
/// An explicit path that cannot be read or parsed is an error. A discovered
/// file that fails is logged and defaults are used.
pub(crate) fn load_cli_config(explicit: Option<&Path>) -> anyhow::Result<CliConfig> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::debug!(?path, "Loaded CLI config");
        return Ok(config);
    }

    if let Some(path) = find_config_file() {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::debug!(?path, "Loaded CLI config");
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!(?path, error = %e, "Failed to parse CLI config, using defaults");
                }
            },
            Err(e) => {
                tracing::warn!(?path, error = %e, "Failed to read CLI config, using defaults");
            }
        }
    }
    Ok(CliConfig::default())
}

/// Search for config file in precedence order.
fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.is_file() {
        return Some(local);
    }

    if let Some(home) = home_dir() {
        let global = home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILENAME);
        if global.is_file() {
            return Some(global);
        }
    }

    None
}

/// Expand a configured path, resolving `~` to the home directory.
pub(crate) fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/docs/scenarios");
        assert!(expanded.to_str().unwrap().contains("docs/scenarios"));
        assert!(!expanded.to_str().unwrap().starts_with('~'));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/srv/scenarios"), PathBuf::from("/srv/scenarios"));
    }

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert!(config.scenario_dir.is_none());
        assert!(config.interpreters.is_empty());
        assert_eq!(config.escrow.increment, 500_000);
        assert_eq!(config.scenario_dir(), PathBuf::from("scenarios"));
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
scenario-dir = "./docs/scenarios"
cache-path = "./docs/cache.json"
api-location = "https://api.example.com"
execute-lang = "python"
disabled-languages = ["php"]

[escrow]
threshold = 1000000

[interpreters]
python = "python3 -u"
"#;
        let config: CliConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scenario_dir.as_deref(), Some("./docs/scenarios"));
        assert_eq!(config.api_location.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.execute_lang.as_deref(), Some("python"));
        assert_eq!(config.disabled_languages, vec!["php"]);
        assert_eq!(config.escrow.threshold, 1_000_000);
        assert_eq!(config.escrow.increment, 500_000);
        assert_eq!(
            config.interpreters.get("python").map(String::as_str),
            Some("python3 -u")
        );
        assert_eq!(config.cache_path(), PathBuf::from("./docs/cache.json"));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cli_config(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_explicit_config_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docsnip.toml");
        std::fs::write(&path, "execute-lang = \"ruby\"\n").unwrap();
        let config = load_cli_config(Some(&path)).unwrap();
        assert_eq!(config.execute_lang.as_deref(), Some("ruby"));
    }
}
