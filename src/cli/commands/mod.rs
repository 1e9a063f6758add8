//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. Errors are returned to `main`,
//! which maps them to exit codes with [`ReprunError::exit_code`].
//!
//! [`ReprunError::exit_code`]: crate::error::ReprunError::exit_code

pub mod check;
pub mod completions;
pub mod dispatcher;
pub mod history;
pub mod run;
pub mod status;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
