//! Runtime template engine for scenario templates.
//!
//! Each scenario directory holds one `.tera` file per client language
//! (`curl.tera`, `python.tera`, ...). Every template is rendered twice: once in
//! `definition` mode for the static documentation view and once in `request`
//! mode for the executable snippet.

mod engine;
mod filters;
mod functions;
mod loader;

pub use engine::{EngineError, RenderContext, RenderMode, TemplateEngine};
pub use loader::LoaderError;
