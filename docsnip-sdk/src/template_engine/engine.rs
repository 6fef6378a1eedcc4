//! Tera-based scenario rendering with custom filter and function registration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};

use super::filters;
use super::functions::{RouteFn, UrlFor};
use super::loader::{load_template_files, load_templates_from_dir, LoaderError};
use crate::routes::RouteTable;
use crate::scenario::TemplateFile;

/// Which of the two passes a template is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Static documentation view (method and route pattern).
    Definition,
    /// Fully parameterized executable script or command line.
    Request,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Request => "request",
        }
    }
}

/// Variables available to every scenario template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderContext {
    pub name: String,
    pub lang: String,
    pub api_location: String,
    pub api_key: String,
    pub marketplace: Value,
    pub payload: Value,
    /// Dependency name → cached response (parsed JSON when possible).
    pub deps: BTreeMap<String, Value>,
}

/// Template engine for a single scenario directory.
#[derive(Debug)]
pub struct TemplateEngine {
    tera: Tera,
    routes: Arc<RouteTable>,
    template_dir: PathBuf,
}

impl TemplateEngine {
    /// Load every `.tera` template in a scenario directory.
    pub fn load(template_dir: &Path, routes: Arc<RouteTable>) -> Result<Self, EngineError> {
        let tera = load_templates_from_dir(template_dir)?;
        Ok(Self::with_helpers(tera, routes, template_dir))
    }

    /// Load only `files`; other templates in the directory are not parsed.
    pub fn load_files(
        template_dir: &Path,
        files: &[TemplateFile],
        routes: Arc<RouteTable>,
    ) -> Result<Self, EngineError> {
        let tera = load_template_files(template_dir, files)?;
        Ok(Self::with_helpers(tera, routes, template_dir))
    }

    fn with_helpers(mut tera: Tera, routes: Arc<RouteTable>, template_dir: &Path) -> Self {
        tera.register_filter("snake_case", filters::snake_case);
        tera.register_filter("pascal_case", filters::pascal_case);
        tera.register_filter("camel_case", filters::camel_case);
        tera.register_filter("kebab_case", filters::kebab_case);
        tera.register_filter("payload", filters::payload);
        tera.register_function("route", RouteFn::new(Arc::clone(&routes)));

        Self {
            tera,
            routes,
            template_dir: template_dir.to_path_buf(),
        }
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    /// Registered template names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tera.get_template_names().collect();
        names.sort_unstable();
        names
    }

    /// Render one template for the given pass.
    pub fn render(
        &self,
        template: &str,
        mode: RenderMode,
        ctx: &RenderContext,
    ) -> Result<String, EngineError> {
        let mut context = Context::from_serialize(ctx).map_err(EngineError::Context)?;
        context.insert("mode", mode.as_str());

        // `url_for` depends on the pass and the API target, so it is bound per render
        let mut tera = self.tera.clone();
        tera.register_function(
            "url_for",
            UrlFor::new(Arc::clone(&self.routes), ctx.api_location.clone(), mode),
        );

        tera.render(template, &context)
            .map_err(|e| EngineError::Render {
                template: template.to_string(),
                mode: mode.as_str(),
                source: e,
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] LoaderError),
    #[error("failed to build template context: {0}")]
    Context(tera::Error),
    #[error("render error for '{template}' ({mode} pass)")]
    Render {
        template: String,
        mode: &'static str,
        source: tera::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn routes() -> Arc<RouteTable> {
        Arc::new(
            RouteTable::from_toml_str(
                r#"
[[routes]]
name = "debits.create"
method = "POST"
path = "/v1/marketplaces/{marketplace_id}/debits"
"#,
            )
            .unwrap(),
        )
    }

    fn setup_scenario_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();

        let curl = r#"{% set r = route(name="debits.create") -%}
{% if mode == "definition" -%}
{{ r.method }} {{ url_for(name="debits.create", marketplace_id=marketplace.id) }}
{%- else -%}
curl {{ url_for(name="debits.create", marketplace_id=marketplace.id) }} \
    -u {{ api_key }}: \
    {{ payload | payload(style="curl") }} \
    -d "source_uri={{ deps.card_create.uri }}"
{%- endif %}"#;
        fs::write(dir.path().join("curl.tera"), curl).unwrap();

        let python = r#"{% if mode == "definition" %}balanced.Debit{% else %}import balanced

balanced.configure('{{ api_key }}')
card = balanced.Card.find('{{ deps.card_create.uri }}')
card.debit(
    {{ payload | payload(style="python") }}
)
{% endif %}"#;
        fs::write(dir.path().join("python.tera"), python).unwrap();

        dir
    }

    fn context() -> RenderContext {
        let mut deps = BTreeMap::new();
        deps.insert("card_create".to_string(), json!({"uri": "/v1/cards/CC1"}));
        RenderContext {
            name: "debit_create".to_string(),
            lang: "curl".to_string(),
            api_location: "https://api.example.com".to_string(),
            api_key: "ak-test-123".to_string(),
            marketplace: json!({"id": "MP9"}),
            payload: json!({"amount": 5000}),
            deps,
        }
    }

    #[test]
    fn test_engine_load() {
        let dir = setup_scenario_dir();
        let engine = TemplateEngine::load(dir.path(), routes()).unwrap();
        assert_eq!(engine.template_names(), vec!["curl.tera", "python.tera"]);
        assert_eq!(engine.template_dir(), dir.path());
    }

    #[test]
    fn test_definition_pass() {
        let dir = setup_scenario_dir();
        let engine = TemplateEngine::load(dir.path(), routes()).unwrap();

        let rendered = engine
            .render("curl.tera", RenderMode::Definition, &context())
            .unwrap();
        assert_eq!(rendered, "POST /v1/marketplaces/{marketplace_id}/debits");
    }

    #[test]
    fn test_request_pass() {
        let dir = setup_scenario_dir();
        let engine = TemplateEngine::load(dir.path(), routes()).unwrap();

        let rendered = engine
            .render("curl.tera", RenderMode::Request, &context())
            .unwrap();
        assert!(rendered.starts_with("curl https://api.example.com/v1/marketplaces/MP9/debits"));
        assert!(rendered.contains("-u ak-test-123:"));
        assert!(rendered.contains("-d \"amount=5000\""));
        assert!(rendered.contains("source_uri=/v1/cards/CC1"));

        let mut ctx = context();
        ctx.lang = "python".to_string();
        let python = engine
            .render("python.tera", RenderMode::Request, &ctx)
            .unwrap();
        assert!(python.contains("balanced.configure('ak-test-123')"));
        assert!(python.contains("    amount=5000\n)"));
    }

    #[test]
    fn test_render_failure_names_template_and_pass() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ruby.tera"), "{{ deps.missing.uri }}").unwrap();
        let engine = TemplateEngine::load(dir.path(), routes()).unwrap();

        let err = engine
            .render("ruby.tera", RenderMode::Request, &context())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ruby.tera"));
        assert!(message.contains("request pass"));
    }

    #[test]
    fn test_missing_template() {
        let dir = setup_scenario_dir();
        let engine = TemplateEngine::load(dir.path(), routes()).unwrap();
        assert!(engine
            .render("php.tera", RenderMode::Definition, &context())
            .is_err());
    }
}
