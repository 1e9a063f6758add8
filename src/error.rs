//! Error types for reprun operations.
//!
//! This module defines [`ReprunError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Definition and cycle errors are fatal and raised before any process launches
//! - Stage failures are retried by the engine; a run they stop reports
//!   `StageExecution` through `RunReport::error`, a cancelled run `Cancelled`
//! - Ledger write failures are fatal: a run never advances past an unrecorded stage
//! - Log sink failures are reported as `LoggingDegraded` and never abort a run

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a failed stage.
pub const EXIT_STAGE_FAILED: i32 = 1;
/// Exit code for a malformed pipeline definition.
pub const EXIT_DEFINITION: i32 = 2;
/// Exit code for a dependency cycle.
pub const EXIT_CYCLE: i32 = 3;
/// Exit code when the ledger could not be written.
pub const EXIT_LEDGER: i32 = 4;
/// Exit code for a run stopped by a signal.
pub const EXIT_CANCELLED: i32 = 130;

/// Why a pipeline definition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Pipeline file does not exist.
    #[error("pipeline file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Pipeline file is not valid YAML for the schema.
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// One or more validation rules failed.
    #[error("invalid pipeline definition:\n  - {}", problems.join("\n  - "))]
    Invalid { problems: Vec<String> },

    /// `--only` or `--from` named a stage that does not exist.
    #[error("unknown stage '{name}' selected")]
    UnknownSelection { name: String },

    /// A required external tool is not on PATH.
    #[error("missing requirement '{tool}': not found on PATH")]
    MissingRequirement { tool: String },
}

/// Core error type for reprun operations.
#[derive(Debug, Error)]
pub enum ReprunError {
    /// The pipeline definition is malformed.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Stage dependencies form a cycle.
    #[error("dependency cycle detected: {}", stages.join(" -> "))]
    Cycle { stages: Vec<String> },

    /// A stage failed after exhausting its attempts.
    #[error("stage '{stage}' failed: {message}")]
    StageExecution { stage: String, message: String },

    /// The log sink could not be written.
    #[error("logging degraded: {message}")]
    LoggingDegraded { message: String },

    /// The ledger could not be durably written.
    #[error("failed to write ledger at {}: {message}", path.display())]
    LedgerWrite { path: PathBuf, message: String },

    /// The ledger exists but cannot be read.
    #[error("failed to read ledger at {}: {message}", path.display())]
    LedgerRead { path: PathBuf, message: String },

    /// The run was stopped by an external request.
    #[error("run cancelled")]
    Cancelled,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReprunError {
    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Definition(_) | Self::LedgerRead { .. } => EXIT_DEFINITION,
            Self::Cycle { .. } => EXIT_CYCLE,
            Self::LedgerWrite { .. } => EXIT_LEDGER,
            Self::Cancelled => EXIT_CANCELLED,
            Self::StageExecution { .. }
            | Self::LoggingDegraded { .. }
            | Self::Io(_)
            | Self::Other(_) => EXIT_STAGE_FAILED,
        }
    }
}

/// Result type alias for reprun operations.
pub type Result<T> = std::result::Result<T, ReprunError>;
