//! Per-language execution of rendered requests.
//!
//! Script languages are written to `<workspace>/<lang>/scenario.<ext>` and run
//! with the language's interpreter from inside that directory, so client
//! libraries installed there are picked up. `curl` is the baseline pass-through
//! language: its rendered command line is tokenized and invoked directly.
//!
//! Uses `tokio::process` and waits for the child to exit; there is no timeout.

mod tokenize;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;

use tokenize::split_command_line;

const SCRIPT_STEM: &str = "scenario";

/// Languages that can be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Language {
    Curl,
    Python,
    Ruby,
    Php,
}

impl Language {
    /// The pass-through language every run may execute.
    pub const BASELINE: Language = Language::Curl;

    pub fn tag(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Python => "python",
            Self::Ruby => "ruby",
            Self::Php => "php",
        }
    }

    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::Curl => None,
            Self::Python => Some("py"),
            Self::Ruby => Some("rb"),
            Self::Php => Some("php"),
        }
    }

    pub fn default_program(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Python => "python",
            Self::Ruby => "ruby",
            Self::Php => "php",
        }
    }
}

impl FromStr for Language {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "curl" => Ok(Self::Curl),
            "python" => Ok(Self::Python),
            "ruby" => Ok(Self::Ruby),
            "php" => Ok(Self::Php),
            other => Err(ExecError::Unsupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Runs rendered requests in per-language scratch directories.
#[derive(Debug, Clone)]
pub struct Executor {
    workspace: PathBuf,
    /// Language tag → program command line overriding the default.
    programs: BTreeMap<String, String>,
}

impl Executor {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            programs: BTreeMap::new(),
        }
    }

    /// Override the program used for a language (e.g. `python` → `python3 -u`).
    pub fn with_program(mut self, lang: impl Into<String>, program: impl Into<String>) -> Self {
        self.programs.insert(lang.into(), program.into());
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn program(&self, lang: Language) -> Result<Vec<String>, ExecError> {
        let configured = self
            .programs
            .get(lang.tag())
            .map(String::as_str)
            .unwrap_or_else(|| lang.default_program());
        let argv = split_command_line(configured)?;
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand(lang.tag().to_string()));
        }
        Ok(argv)
    }

    /// Execute `script` as language `lang` and return its trimmed stdout,
    /// canonically pretty-printed when it is JSON.
    pub async fn execute(&self, lang: &str, script: &str) -> Result<String, ExecError> {
        let language: Language = lang.parse()?;
        let dir = self.workspace.join(language.tag());
        std::fs::create_dir_all(&dir).map_err(|e| ExecError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let program = self.program(language)?;
        let mut command = Command::new(&program[0]);
        command.args(&program[1..]).current_dir(&dir);

        match language.extension() {
            None => {
                let argv = split_command_line(script)?;
                if argv.is_empty() {
                    return Err(ExecError::EmptyCommand(language.tag().to_string()));
                }
                // argv[0] is the tool named in the template; the configured program replaces it
                command.args(&argv[1..]);
            }
            Some(ext) => {
                let script_path = dir.join(format!("{SCRIPT_STEM}.{ext}"));
                std::fs::write(&script_path, script).map_err(|e| ExecError::Io {
                    path: script_path.clone(),
                    source: e,
                })?;
                command.arg(format!("{SCRIPT_STEM}.{ext}"));
            }
        }

        tracing::debug!(lang = %language, program = %program[0], dir = ?dir, "Executing scenario");
        let output = command.output().await.map_err(|e| ExecError::Spawn {
            program: program[0].clone(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(ExecError::Failed {
                lang: language.tag().to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(pretty_json(stdout.trim()))
    }
}

/// Whether `text` parses as JSON.
pub fn is_json(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Pretty-print JSON with sorted keys and 4-space indent; other text is
/// returned unchanged. Applying it twice yields the same output.
pub fn pretty_json(text: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };
    if !(value.is_object() || value.is_array()) {
        return text.to_string();
    }

    let sorted = sort_keys(value);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if sorted.serialize(&mut serializer).is_err() {
        return text.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| text.to_string())
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("unsupported execution language '{0}'")]
    Unsupported(String),

    #[error("empty command line for '{0}'")]
    EmptyCommand(String),

    #[error("unbalanced {0} quote in command line")]
    UnbalancedQuote(char),

    #[error("failed to start '{program}'")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{lang} execution failed (exit status {status:?}): {stderr}")]
    Failed {
        lang: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("workspace IO error at {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
