//! # SDK Error Types
//!
//! Unified error handling for scenario rendering, execution, caching and bootstrap.

use thiserror::Error;

use crate::api::ApiError;
use crate::cache::CacheError;
use crate::executor::ExecError;
use crate::routes::RouteError;
use crate::scenario::ScenarioError;
use crate::template_engine::EngineError;

/// SDK operation result type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the scenario pipeline
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Template(#[from] EngineError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Execution(#[from] ExecError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid escrow policy: {0}")]
    InvalidEscrowPolicy(String),

    #[error("scenario '{0}' produced no response to cache")]
    NoResponse(String),

    #[error("scenario '{0}' already failed in this run")]
    AlreadyFailed(String),

    #[error("scenario '{scenario}' depends on '{dependency}', which has no cached response")]
    UnresolvedDependency {
        scenario: String,
        dependency: String,
    },
}

/// Render an error and its full source chain, one cause per line.
///
/// Tera nests the failing template, the include/macro frames and the root cause
/// as successive `source()` values, so the chain is the template trace.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
