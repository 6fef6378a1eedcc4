//! # docsnip SDK
//!
//! Renders per-language code samples for a payments API, executes them and
//! assembles documentation blocks from their live responses.
//!
//! ## Modules
//!
//! - [`template_engine`]: Tera rendering with the `route`/`url_for` helpers and payload filters
//! - [`routes`]: routing table of named endpoints and their path variants
//! - [`scenario`]: scenario discovery, metadata and per-template render/execute state
//! - [`executor`]: per-language subprocess execution and canonical JSON output
//! - [`cache`]: on-disk scenario cache and the block format
//! - [`resolver`]: dependency planning with cycle detection
//! - [`api`] / [`bootstrap`]: credential provisioning and escrow top-up
//! - [`runner`]: batch evaluation of requested scenarios
//! - [`error`]: unified error type

pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod routes;
pub mod runner;
pub mod scenario;
pub mod template_engine;

pub use cache::{Block, ScenarioCache, Section};
pub use error::{Error, Result};
pub use runner::{BatchRunner, RunOptions, RunReport};
