//! Batch runner: evaluates requested scenarios and collects their blocks.
//!
//! For each requested name the runner resolves the scenario's requirements
//! through the cache (evaluating misses in dependency order), then renders and
//! executes every template variant that survives the execution filters. One
//! block is emitted per surviving variant; the first executed variant with a
//! response is what gets cached under the scenario name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::api::PaymentsApi;
use crate::bootstrap::{BootstrapOutcome, Bootstrapper, EscrowPolicy, ExecutionContext};
use crate::cache::{Block, ScenarioCache};
use crate::error::{error_chain, Error, Result};
use crate::executor::{Executor, Language};
use crate::resolver::Resolver;
use crate::routes::RouteTable;
use crate::scenario::{Scenario, ScenarioDir, ScenarioMetadata, TemplateFile};
use crate::template_engine::{RenderContext, TemplateEngine};

/// Scenario names containing this marker only run when destructive runs are enabled.
const DESTRUCTIVE_MARKER: &str = "delete";

/// Options for one batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Language executed besides the baseline pass-through.
    pub execute_lang: String,
    /// Languages skipped for every scenario.
    pub disabled_languages: BTreeSet<String>,
    /// Run scenarios whose name contains `delete`.
    pub include_delete: bool,
    /// Render only: no bootstrap, no execution, no cache writes.
    pub dry_run: bool,
    /// API location rendered into requests when no execution context exists.
    pub api_location: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            execute_lang: Language::BASELINE.tag().to_string(),
            disabled_languages: BTreeSet::new(),
            include_delete: false,
            dry_run: false,
            api_location: String::new(),
        }
    }
}

/// Why a template variant was not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Name contains `delete` and destructive runs are off.
    Destructive,
    /// Language is neither the execute language nor the baseline.
    LanguageNotSelected,
    /// Language disabled globally or in `scenario.toml`.
    Disabled,
}

impl RunOptions {
    /// Filter applied to every template variant before rendering.
    pub fn skip_reason(
        &self,
        name: &str,
        lang: &str,
        metadata: &ScenarioMetadata,
    ) -> Option<SkipReason> {
        if name.contains(DESTRUCTIVE_MARKER) && !self.include_delete {
            return Some(SkipReason::Destructive);
        }
        if lang != self.execute_lang && lang != Language::BASELINE.tag() {
            return Some(SkipReason::LanguageNotSelected);
        }
        if self.disabled_languages.contains(lang) || metadata.is_disabled_for(lang) {
            return Some(SkipReason::Disabled);
        }
        None
    }
}

/// A block as written to the output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedBlock {
    pub name: String,
    pub lang: String,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioFailure {
    pub name: String,
    pub error: String,
}

/// Result of a batch run.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub blocks: Vec<EmittedBlock>,
    pub failures: Vec<ScenarioFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sequential scenario evaluator bound to one scenario directory and cache.
pub struct BatchRunner {
    scenarios: ScenarioDir,
    routes: Arc<RouteTable>,
    executor: Executor,
    cache: ScenarioCache,
    options: RunOptions,
    context: Option<ExecutionContext>,
    /// Blocks produced by scenarios already evaluated in this run.
    evaluated: BTreeMap<String, Vec<EmittedBlock>>,
    /// Scenarios whose evaluation failed in this run.
    failed: BTreeSet<String>,
}

impl BatchRunner {
    /// Create a runner. An execute language with no executor is rejected here.
    pub fn new(
        scenarios: ScenarioDir,
        routes: Arc<RouteTable>,
        executor: Executor,
        cache: ScenarioCache,
        options: RunOptions,
    ) -> Result<Self> {
        options.execute_lang.parse::<Language>()?;
        Ok(Self {
            scenarios,
            routes,
            executor,
            cache,
            options,
            context: None,
            evaluated: BTreeMap::new(),
            failed: BTreeSet::new(),
        })
    }

    pub fn cache(&self) -> &ScenarioCache {
        &self.cache
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn into_cache(self) -> ScenarioCache {
        self.cache
    }

    /// Provision or validate credentials, then persist them.
    pub async fn bootstrap(
        &mut self,
        api: &dyn PaymentsApi,
        escrow: EscrowPolicy,
    ) -> Result<BootstrapOutcome> {
        let outcome = Bootstrapper::new(api, self.options.api_location.clone(), escrow)
            .ensure(&mut self.cache)
            .await?;
        self.cache.save()?;
        self.context = Some(outcome.context.clone());
        Ok(outcome)
    }

    /// Run every name in order (all discovered scenarios when `names` is empty).
    ///
    /// A failing scenario is logged and recorded; the run carries on with the next.
    pub async fn run(&mut self, names: &[String]) -> Result<RunReport> {
        let names = if names.is_empty() {
            self.scenarios.list()?
        } else {
            names.to_vec()
        };

        let mut report = RunReport::default();
        for name in &names {
            match self.run_one(name).await {
                Ok(blocks) => {
                    info!(scenario = %name, blocks = blocks.len(), "Scenario complete");
                    report.blocks.extend(blocks);
                }
                Err(e) => {
                    let chain = error_chain(&e);
                    error!(scenario = %name, "Scenario failed: {chain}");
                    report.failures.push(ScenarioFailure {
                        name: name.clone(),
                        error: chain,
                    });
                }
            }
        }
        Ok(report)
    }

    async fn run_one(&mut self, name: &str) -> Result<Vec<EmittedBlock>> {
        if !self.options.dry_run {
            let metadata = self.scenarios.metadata(name)?;
            for dependency in &metadata.requires {
                self.get(dependency).await.map_err(|e| match e {
                    Error::NoResponse(_) | Error::AlreadyFailed(_) => {
                        Error::UnresolvedDependency {
                            scenario: name.to_string(),
                            dependency: dependency.clone(),
                        }
                    }
                    other => other,
                })?;
            }
        }
        self.evaluate(name).await
    }

    /// The cached block for `name`, evaluating it and its requirements on a miss.
    pub async fn get(&mut self, name: &str) -> Result<Block> {
        let plan = {
            let cache = &self.cache;
            Resolver::new(&self.scenarios).plan(name, &|n: &str| cache.contains(n))?
        };
        if !plan.is_empty() {
            debug!(scenario = %name, plan = ?plan, "Resolving cache miss");
        }
        for step in &plan {
            self.evaluate(step).await?;
        }

        self.cache
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoResponse(name.to_string()))
    }

    /// Render and execute every surviving variant of `name` once per run.
    ///
    /// A failure is remembered too: later requests for `name` in the same run
    /// get [`Error::AlreadyFailed`] instead of executing it again.
    async fn evaluate(&mut self, name: &str) -> Result<Vec<EmittedBlock>> {
        if let Some(blocks) = self.evaluated.get(name) {
            return Ok(blocks.clone());
        }
        if self.failed.contains(name) {
            return Err(Error::AlreadyFailed(name.to_string()));
        }

        let outcome = self.evaluate_scenario(name).await;
        match &outcome {
            Ok(blocks) => {
                self.evaluated.insert(name.to_string(), blocks.clone());
            }
            Err(_) => {
                self.failed.insert(name.to_string());
            }
        }
        outcome
    }

    async fn evaluate_scenario(&mut self, name: &str) -> Result<Vec<EmittedBlock>> {
        let metadata = self.scenarios.metadata(name)?;
        let templates: Vec<TemplateFile> = self
            .scenarios
            .templates(name)?
            .into_iter()
            .filter(|template| self.admits(name, template, &metadata))
            .collect();
        if templates.is_empty() {
            return Ok(Vec::new());
        }

        let deps = self.dependency_responses(name, &metadata)?;
        let engine = TemplateEngine::load_files(
            &self.scenarios.path_of(name),
            &templates,
            Arc::clone(&self.routes),
        )?;

        let mut scenarios = Vec::with_capacity(templates.len());
        for template in &templates {
            scenarios.push(
                self.evaluate_variant(name, template, &metadata, &engine, &deps)
                    .await?,
            );
        }

        if !self.options.dry_run {
            if let Some(executed) = scenarios.iter().find(|s| s.executed && s.response.is_some()) {
                self.cache.insert(name, executed.to_block())?;
                self.cache.save()?;
            } else {
                debug!(scenario = %name, "No response produced, nothing cached");
            }
        }

        Ok(scenarios
            .iter()
            .map(|s| EmittedBlock {
                name: s.name.clone(),
                lang: s.lang.clone(),
                block: s.to_block(),
            })
            .collect())
    }

    /// Whether a template variant survives the execution filters.
    fn admits(&self, name: &str, template: &TemplateFile, metadata: &ScenarioMetadata) -> bool {
        match self.options.skip_reason(name, &template.lang, metadata) {
            Some(SkipReason::Disabled) => {
                info!(scenario = %name, lang = %template.lang, "Language disabled, skipping");
                false
            }
            Some(reason) => {
                debug!(scenario = %name, lang = %template.lang, ?reason, "Filtered out");
                false
            }
            None => true,
        }
    }

    async fn evaluate_variant(
        &self,
        name: &str,
        template: &TemplateFile,
        metadata: &ScenarioMetadata,
        engine: &TemplateEngine,
        deps: &BTreeMap<String, Value>,
    ) -> Result<Scenario> {
        let mut scenario = Scenario::new(name, template);
        let ctx = self.render_context(name, &template.lang, metadata, deps);
        scenario.render(engine, &ctx)?;

        if !self.options.dry_run {
            scenario.execute(&self.executor).await?;
        }
        Ok(scenario)
    }

    /// Cached responses of `name`'s requirements, keyed by requirement name.
    fn dependency_responses(
        &self,
        name: &str,
        metadata: &ScenarioMetadata,
    ) -> Result<BTreeMap<String, Value>> {
        let mut deps = BTreeMap::new();
        for dependency in &metadata.requires {
            match self.cache.get(dependency).and_then(Block::response_value) {
                Some(response) => {
                    deps.insert(dependency.clone(), response);
                }
                None if self.options.dry_run => {
                    debug!(scenario = %name, %dependency, "Dependency not cached, left undefined");
                }
                None => {
                    return Err(Error::UnresolvedDependency {
                        scenario: name.to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(deps)
    }

    fn render_context(
        &self,
        name: &str,
        lang: &str,
        metadata: &ScenarioMetadata,
        deps: &BTreeMap<String, Value>,
    ) -> RenderContext {
        let (api_location, api_key, marketplace) = match &self.context {
            Some(context) => (
                context.api_location.clone(),
                context.api_key.clone(),
                context.marketplace.clone(),
            ),
            None => (
                self.cache
                    .api_location()
                    .unwrap_or(&self.options.api_location)
                    .to_string(),
                self.cache.api_key().unwrap_or_default().to_string(),
                self.cache.marketplace().cloned().unwrap_or(Value::Null),
            ),
        };

        RenderContext {
            name: name.to_string(),
            lang: lang.to_string(),
            api_location,
            api_key,
            marketplace,
            payload: metadata.payload_value(),
            deps: deps.clone(),
        }
    }
}
