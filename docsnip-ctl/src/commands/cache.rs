//! `docsnip cache show|clear`.

use std::path::PathBuf;
use std::process::ExitCode;

use docsnip_sdk::ScenarioCache;

use crate::cli_config::CliConfig;
use crate::output;
use crate::CacheCommands;

pub(crate) fn handle_cache_command(
    cmd: CacheCommands,
    cli_config: &CliConfig,
) -> anyhow::Result<ExitCode> {
    match cmd {
        CacheCommands::Show { name, cache } => {
            let cache = ScenarioCache::load(cache.unwrap_or_else(|| cli_config.cache_path()));
            show(&cache, name.as_deref())
        }
        CacheCommands::Clear { name, cache } => {
            let path: PathBuf = cache.unwrap_or_else(|| cli_config.cache_path());
            let mut cache = ScenarioCache::load(path);
            clear(&mut cache, name.as_deref())
        }
    }
}

fn show(cache: &ScenarioCache, name: Option<&str>) -> anyhow::Result<ExitCode> {
    if let Some(name) = name {
        return match cache.get(name) {
            Some(block) => {
                output::json(block)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                output::error(format!("'{name}' is not cached"));
                Ok(ExitCode::FAILURE)
            }
        };
    }

    output::header(format!("Scenario cache {}:", cache.path().display()));
    output::label("  API location", cache.api_location().unwrap_or("(none)"));
    output::label("  API key", if cache.api_key().is_some() { "(set)" } else { "(none)" });
    if let Some(id) = cache
        .marketplace()
        .and_then(|m| m.get("id"))
        .and_then(|id| id.as_str())
    {
        output::label("  Marketplace", id);
    }
    output::blank();

    if cache.len() == 0 {
        output::plain("No cached scenarios.");
    } else {
        for name in cache.names() {
            let lang = cache.get(name).map(|b| b.lang()).unwrap_or_default();
            output::item(format!("{name} [{lang}]"));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn clear(cache: &mut ScenarioCache, name: Option<&str>) -> anyhow::Result<ExitCode> {
    match name {
        Some(name) => {
            if cache.remove(name).is_none() {
                output::warning(format!("'{name}' is not cached"));
                return Ok(ExitCode::SUCCESS);
            }
            cache.save()?;
            output::success(format!("Removed '{name}' from the cache"));
        }
        None => {
            let count = cache.len();
            cache.clear_blocks();
            cache.save()?;
            output::success(format!("Cleared {count} cached scenario(s)"));
        }
    }
    Ok(ExitCode::SUCCESS)
}
