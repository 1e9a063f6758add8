//! Per-stage run records.
//!
//! A [`RunRecord`] tracks one stage within one run from scheduling to its
//! terminal status. The engine creates it, moves it through its lifecycle
//! and hands every transition to the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::RunId;

/// Status of a stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Scheduled, not yet launched.
    Pending,
    /// Process launched.
    Running,
    /// Exited zero and produced every declared output.
    Succeeded,
    /// Exhausted its attempts, was blocked, or was cancelled.
    Failed,
    /// Outputs already matched a prior successful run.
    Skipped,
}

impl StageStatus {
    /// Check if this is a terminal state (no more changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Whether dependents may run after this status.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Get a display character for this status.
    pub fn display_char(&self) -> char {
        match self {
            Self::Pending => '○',
            Self::Running => '◉',
            Self::Succeeded => '✓',
            Self::Failed => '✗',
            Self::Skipped => '⊘',
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Content hashes keyed by the declared path.
pub type PathHashes = BTreeMap<String, String>;

/// Run of each dependency's latest success, keyed by dependency name.
pub type UpstreamRuns = BTreeMap<String, RunId>;

/// Record of one stage in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run this record belongs to.
    pub run_id: RunId,

    /// Stage name.
    pub stage_name: String,

    /// Current status.
    pub status: StageStatus,

    /// When the first attempt launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the stage reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Input hashes observed before launch.
    #[serde(default)]
    pub input_hashes: PathHashes,

    /// Output hashes observed after success.
    #[serde(default)]
    pub output_hashes: PathHashes,

    /// Dependency successes this stage ran (or skipped) against.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub upstream: UpstreamRuns,

    /// Attempts made so far.
    #[serde(default)]
    pub attempt_count: u32,

    /// Exit code of the last attempt, if it exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    /// A freshly scheduled record.
    pub fn pending(run_id: RunId, stage_name: &str) -> Self {
        Self {
            run_id,
            stage_name: stage_name.to_string(),
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            input_hashes: BTreeMap::new(),
            output_hashes: BTreeMap::new(),
            upstream: BTreeMap::new(),
            attempt_count: 0,
            exit_code: None,
            error: None,
        }
    }

    /// Mark a new attempt as launched.
    pub fn start_attempt(&mut self, input_hashes: PathHashes) {
        self.status = StageStatus::Running;
        self.attempt_count += 1;
        self.started_at.get_or_insert_with(Utc::now);
        self.input_hashes = input_hashes;
        self.exit_code = None;
        self.error = None;
    }

    /// Mark the stage succeeded with the hashes of its outputs.
    pub fn succeed(&mut self, exit_code: Option<i32>, output_hashes: PathHashes) {
        self.status = StageStatus::Succeeded;
        self.exit_code = exit_code;
        self.output_hashes = output_hashes;
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the stage failed.
    pub fn fail(&mut self, exit_code: Option<i32>, error: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.exit_code = exit_code;
        self.output_hashes.clear();
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Mark the stage skipped, carrying forward the hashes that matched.
    pub fn skip(&mut self, input_hashes: PathHashes, output_hashes: PathHashes) {
        let now = Utc::now();
        self.status = StageStatus::Skipped;
        self.input_hashes = input_hashes;
        self.output_hashes = output_hashes;
        self.started_at = Some(now);
        self.finished_at = Some(now);
    }

    /// Wall-clock time between launch and finish.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
