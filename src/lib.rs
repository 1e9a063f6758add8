//! Reprun - dependency-aware, resumable stage pipelines.
//!
//! Reprun runs the stages of a research pipeline (cleaning, analysis,
//! figure generation) as external commands, in dependency order, and keeps
//! a durable ledger of what succeeded. A re-run skips stages whose inputs
//! and outputs still match their last success and resumes after a failure
//! without redoing finished work.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Pipeline file parsing and validation
//! - [`error`] - Error types, result alias and exit codes
//! - [`logging`] - Per-run structured log file
//! - [`pipeline`] - Validated stage descriptors and requirement checks
//! - [`runner`] - Dependency graph and the execution engine
//! - [`shell`] - External process execution and signal handling
//! - [`state`] - Run records, change detection and the ledger
//! - [`ui`] - Terminal output
//!
//! # Example
//!
//! ```
//! use reprun::runner::DependencyGraph;
//!
//! let graph = DependencyGraph::builder()
//!     .add_stage("setup", Vec::<String>::new())
//!     .add_stage("clean", ["setup"])
//!     .add_stage("analyze", ["clean"])
//!     .build()
//!     .unwrap();
//! assert_eq!(graph.order().unwrap(), vec!["setup", "clean", "analyze"]);
//! ```
//!
//! For running pipelines from files, see the integration tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod runner;
pub mod shell;
pub mod state;
pub mod ui;

pub use error::{ReprunError, Result};
