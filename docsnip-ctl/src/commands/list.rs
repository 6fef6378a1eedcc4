//! `docsnip list`: discovered scenarios, their languages and requirements.

use std::path::PathBuf;
use std::process::ExitCode;

use docsnip_sdk::scenario::ScenarioDir;

use crate::cli_config::CliConfig;
use crate::output;

pub(crate) fn handle_list_command(
    scenario_dir: Option<PathBuf>,
    cli_config: &CliConfig,
) -> anyhow::Result<ExitCode> {
    let root = scenario_dir.unwrap_or_else(|| cli_config.scenario_dir());
    let scenarios = ScenarioDir::open(&root)?;
    let names = scenarios.list()?;

    if names.is_empty() {
        output::warning(format!("No scenarios found in {}", root.display()));
        output::hint("Each scenario is a directory holding one <language>.tera template per client.");
        return Ok(ExitCode::SUCCESS);
    }

    output::header(format!("Scenarios in {}:", root.display()));
    output::blank();
    for name in &names {
        let templates = scenarios.templates(name)?;
        let metadata = scenarios.metadata(name)?;
        let langs: Vec<&str> = templates.iter().map(|t| t.lang.as_str()).collect();

        output::item(name);
        if let Some(description) = &metadata.description {
            output::label("    Description", description);
        }
        output::label("    Languages", langs.join(", "));
        if !metadata.requires.is_empty() {
            output::label("    Requires", metadata.requires.join(", "));
        }
        if !metadata.disabled_languages.is_empty() {
            output::label("    Disabled", metadata.disabled_languages.join(", "));
        }
    }
    output::blank();
    output::plain(format!("{} scenario(s)", names.len()));
    Ok(ExitCode::SUCCESS)
}
