//! docsnip: render, execute and cache payments API documentation samples.

mod cli_config;
mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "docsnip", version, about, styles = output::clap_styles())]
pub(crate) struct Cli {
    /// Log level for docsnip targets (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Config file (default: ./.docsnip.toml, then ~/.config/docsnip.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Render and execute scenarios, printing their blocks as a JSON array
    Run(RunArgs),

    /// List discovered scenarios with their languages and requirements
    List {
        /// Scenario directory
        #[arg(long)]
        scenario_dir: Option<PathBuf>,
    },

    /// Inspect or clear the scenario cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// Scenarios to run (all discovered scenarios when omitted)
    pub names: Vec<String>,

    /// Language executed besides curl
    #[arg(long)]
    pub execute_lang: Option<String>,

    /// Skip a language for every scenario (repeatable)
    #[arg(long = "disable-lang")]
    pub disable_lang: Vec<String>,

    /// Payments API base URL
    #[arg(long, env = "DOCSNIP_API_LOCATION")]
    pub api_location: Option<String>,

    /// Run scenarios whose name contains "delete"
    #[arg(long)]
    pub include_delete: bool,

    /// Scenario cache file
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Scenario directory
    #[arg(long)]
    pub scenario_dir: Option<PathBuf>,

    /// Routing table
    #[arg(long)]
    pub routes: Option<PathBuf>,

    /// Scratch directory for per-language scripts
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Render only: no bootstrap, no execution, no cache writes
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CacheCommands {
    /// Show the stored context and cached scenarios, or one cached block
    Show {
        name: Option<String>,

        /// Scenario cache file
        #[arg(long)]
        cache: Option<PathBuf>,
    },

    /// Drop one cached block, or every block when no name is given
    Clear {
        name: Option<String>,

        /// Scenario cache file
        #[arg(long)]
        cache: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "warn,docsnip={level},docsnip_sdk={level}",
            level = cli.log_level
        ))
    })?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli_config = cli_config::load_cli_config(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run(args) => commands::handle_run_command(args, &cli_config).await,
        Commands::List { scenario_dir } => {
            commands::handle_list_command(scenario_dir, &cli_config)
        }
        Commands::Cache(cmd) => commands::handle_cache_command(cmd, &cli_config),
    };

    match result {
        Ok(code) => Ok(code),
        Err(e) => {
            output::error(format!("{e:#}"));
            Ok(ExitCode::FAILURE)
        }
    }
}
