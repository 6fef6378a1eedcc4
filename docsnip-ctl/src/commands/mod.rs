//! Command handlers for the docsnip CLI
//!
//! Each module handles one subcommand, delegating to `docsnip-sdk`.

pub(crate) mod cache;
pub(crate) mod list;
pub(crate) mod run;

pub(crate) use cache::handle_cache_command;
pub(crate) use list::handle_list_command;
pub(crate) use run::handle_run_command;
