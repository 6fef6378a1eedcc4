//! `docsnip run`: bootstrap, evaluate scenarios, print blocks.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use docsnip_sdk::api::HttpPaymentsApi;
use docsnip_sdk::bootstrap::EscrowPolicy;
use docsnip_sdk::executor::Executor;
use docsnip_sdk::routes::RouteTable;
use docsnip_sdk::scenario::ScenarioDir;
use docsnip_sdk::{BatchRunner, RunOptions, ScenarioCache};

use crate::cli_config::{
    expand_path, CliConfig, DEFAULT_API_LOCATION, DEFAULT_ROUTES_PATH, DEFAULT_WORKSPACE_DIR,
};
use crate::output;
use crate::RunArgs;

/// Flags merged over the config file and defaults.
#[derive(Debug)]
pub(crate) struct RunSettings {
    pub scenario_dir: PathBuf,
    pub cache_path: PathBuf,
    pub routes_path: PathBuf,
    pub workspace: PathBuf,
    pub escrow: EscrowPolicy,
    pub options: RunOptions,
}

impl RunSettings {
    pub(crate) fn resolve(args: &RunArgs, config: &CliConfig) -> Self {
        let mut disabled: BTreeSet<String> = config.disabled_languages.iter().cloned().collect();
        disabled.extend(args.disable_lang.iter().cloned());

        let options = RunOptions {
            execute_lang: args
                .execute_lang
                .clone()
                .or_else(|| config.execute_lang.clone())
                .unwrap_or_else(|| RunOptions::default().execute_lang),
            disabled_languages: disabled,
            include_delete: args.include_delete,
            dry_run: args.dry_run,
            api_location: args
                .api_location
                .clone()
                .or_else(|| config.api_location.clone())
                .unwrap_or_else(|| DEFAULT_API_LOCATION.to_string()),
        };

        Self {
            scenario_dir: args
                .scenario_dir
                .clone()
                .unwrap_or_else(|| config.scenario_dir()),
            cache_path: args.cache.clone().unwrap_or_else(|| config.cache_path()),
            routes_path: args.routes.clone().unwrap_or_else(|| {
                expand_path(config.routes_path.as_deref().unwrap_or(DEFAULT_ROUTES_PATH))
            }),
            workspace: args.workspace.clone().unwrap_or_else(|| {
                expand_path(
                    config
                        .workspace_dir
                        .as_deref()
                        .unwrap_or(DEFAULT_WORKSPACE_DIR),
                )
            }),
            escrow: config.escrow.into(),
            options,
        }
    }
}

pub(crate) async fn handle_run_command(
    args: RunArgs,
    cli_config: &CliConfig,
) -> anyhow::Result<ExitCode> {
    let settings = RunSettings::resolve(&args, cli_config);
    tracing::debug!(?settings, "Resolved run settings");

    let scenarios = ScenarioDir::open(&settings.scenario_dir)?;
    let routes = load_routes(&settings, args.routes.is_some())?;

    let mut executor = Executor::new(&settings.workspace);
    for (lang, program) in &cli_config.interpreters {
        executor = executor.with_program(lang, program);
    }

    let cache = ScenarioCache::load(&settings.cache_path);
    let dry_run = settings.options.dry_run;
    let mut runner = BatchRunner::new(scenarios, routes, executor, cache, settings.options)?;

    if !dry_run {
        let api = HttpPaymentsApi::new(&runner.options().api_location)?;
        let outcome = runner
            .bootstrap(&api, settings.escrow)
            .await
            .context("bootstrap failed")?;
        if outcome.provisioned {
            output::success(format!(
                "Provisioned marketplace {}",
                outcome.context.marketplace_id
            ));
        }
    }

    let report = runner.run(&args.names).await?;
    let blocks = report.blocks.len();
    output::json(&report.blocks)?;

    if report.is_success() {
        output::success(format!("Rendered {blocks} blocks"));
        Ok(ExitCode::SUCCESS)
    } else {
        for failure in &report.failures {
            output::error(format!("{}: {}", failure.name, failure.error));
        }
        output::warning(format!(
            "{} scenario(s) failed, {blocks} blocks rendered",
            report.failures.len()
        ));
        Ok(ExitCode::FAILURE)
    }
}

/// Load the routing table. A missing default file yields an empty table;
/// a missing explicit `--routes` file is an error.
fn load_routes(settings: &RunSettings, explicit: bool) -> anyhow::Result<Arc<RouteTable>> {
    if !explicit && !settings.routes_path.is_file() {
        tracing::debug!(path = ?settings.routes_path, "No routing table, route helpers unavailable");
        return Ok(Arc::new(RouteTable::default()));
    }
    let table = RouteTable::load(&settings.routes_path)?;
    tracing::debug!(path = ?settings.routes_path, routes = table.len(), "Loaded routing table");
    Ok(Arc::new(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            names: vec![],
            execute_lang: None,
            disable_lang: vec![],
            api_location: None,
            include_delete: false,
            cache: None,
            scenario_dir: None,
            routes: None,
            workspace: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_defaults() {
        let settings = RunSettings::resolve(&args(), &CliConfig::default());
        assert_eq!(settings.options.execute_lang, "curl");
        assert_eq!(settings.options.api_location, DEFAULT_API_LOCATION);
        assert_eq!(settings.scenario_dir, PathBuf::from("scenarios"));
        assert_eq!(settings.cache_path, PathBuf::from(".docsnip/cache.json"));
        assert_eq!(settings.escrow, EscrowPolicy::default());
    }

    #[test]
    fn test_flags_override_config() {
        let config: CliConfig = toml::from_str(
            r#"
execute-lang = "ruby"
api-location = "https://config.example.com"
disabled-languages = ["php"]
scenario-dir = "from-config"
"#,
        )
        .unwrap();
        let mut args = args();
        args.execute_lang = Some("python".to_string());
        args.disable_lang = vec!["ruby".to_string()];
        args.scenario_dir = Some(PathBuf::from("from-flag"));

        let settings = RunSettings::resolve(&args, &config);
        assert_eq!(settings.options.execute_lang, "python");
        assert_eq!(settings.options.api_location, "https://config.example.com");
        assert_eq!(
            settings.options.disabled_languages,
            BTreeSet::from(["php".to_string(), "ruby".to_string()])
        );
        assert_eq!(settings.scenario_dir, PathBuf::from("from-flag"));
    }
}
