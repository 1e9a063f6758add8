//! Stage scheduling and execution.
//!
//! - [`dependency`] - the [`DependencyGraph`] and its deterministic order
//! - [`engine`] - the [`ExecutionEngine`] state machine and worker pool
//! - [`cancel`] - cooperative [`CancellationToken`]

pub mod cancel;
pub mod dependency;
pub mod engine;

pub use cancel::CancellationToken;
pub use dependency::{DependencyGraph, DependencyGraphBuilder};
pub use engine::{
    ExecutionEngine, PlanAction, PlanEntry, RunOptions, RunProgress, RunReport, RunState,
    StageFailure, STDERR_TAIL_LINES,
};
