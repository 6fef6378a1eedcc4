//! Scenarios: named documentation examples with one template per client language.

mod discovery;
mod metadata;

pub use discovery::{ScenarioDir, TemplateFile};
pub use metadata::{MetadataError, ScenarioMetadata};

use std::path::PathBuf;

use crate::cache::{Block, Section};
use crate::executor::{is_json, ExecError, Executor};
use crate::template_engine::{EngineError, RenderContext, RenderMode, TemplateEngine};

/// One template of a scenario, rendered and possibly executed.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub path: PathBuf,
    pub template_name: String,
    pub lang: String,
    pub definition: String,
    pub request: String,
    pub executed: bool,
    pub response: Option<String>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, template: &TemplateFile) -> Self {
        Self {
            name: name.into(),
            path: template.path.clone(),
            template_name: template.template_name.clone(),
            lang: template.lang.clone(),
            definition: String::new(),
            request: String::new(),
            executed: false,
            response: None,
        }
    }

    /// Run the definition and request passes.
    pub fn render(&mut self, engine: &TemplateEngine, ctx: &RenderContext) -> Result<(), EngineError> {
        self.definition = engine
            .render(&self.template_name, RenderMode::Definition, ctx)?
            .trim()
            .to_string();
        self.request = engine
            .render(&self.template_name, RenderMode::Request, ctx)?
            .trim()
            .to_string();
        Ok(())
    }

    /// Execute the rendered request. A scenario executes at most once.
    pub async fn execute(&mut self, executor: &Executor) -> Result<(), ExecError> {
        if self.executed {
            return Ok(());
        }
        let output = executor.execute(&self.lang, &self.request).await?;
        self.executed = true;
        self.response = (!output.is_empty()).then_some(output);
        Ok(())
    }

    pub fn to_block(&self) -> Block {
        Block {
            definition: Section::new(&self.lang, &self.definition),
            request: Section::new(&self.lang, &self.request),
            response: self.response.as_ref().map(|r| {
                let kind = if is_json(r) { "json" } else { "text" };
                Section::new(kind, r)
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario directory not found: expected {path}")]
    MissingScenarioDir { path: PathBuf },

    #[error("scenario '{name}' not found under {root}")]
    NotFound { name: String, root: PathBuf },

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("dependency cycle: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },
}
