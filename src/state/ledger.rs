//! Persistent run ledger.
//!
//! The ledger is a single YAML document holding a latest-wins index of
//! successful stage records plus a bounded history of runs. Every change is
//! written to a temporary file, flushed to disk and renamed over the ledger,
//! so a crash leaves either the previous or the new document, never a mix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ReprunError, Result};

use super::{RunId, RunRecord, StageStatus};

/// File name of the ledger inside the state directory.
pub const LEDGER_FILE: &str = "ledger.yml";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Still running, or the process died before finishing.
    InProgress,
    /// Every selected stage succeeded or was skipped.
    Completed,
    /// A stage failed or the ledger could not be written.
    Aborted,
    /// Stopped by an external request.
    Cancelled,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One run in the ledger history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntry {
    /// Run identifier.
    pub run_id: RunId,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// How the run ended.
    pub outcome: RunOutcome,

    /// One record per stage scheduled in this run.
    #[serde(default)]
    pub stages: BTreeMap<String, RunRecord>,
}

impl RunEntry {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            started_at: run_id.timestamp(),
            finished_at: None,
            outcome: RunOutcome::InProgress,
            stages: BTreeMap::new(),
        }
    }

    /// Number of stages with the given status.
    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.values().filter(|r| r.status == status).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerDocument {
    version: u32,
    #[serde(default)]
    succeeded: BTreeMap<String, RunRecord>,
    #[serde(default)]
    runs: Vec<RunEntry>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            version: RunLedger::CURRENT_VERSION,
            succeeded: BTreeMap::new(),
            runs: Vec::new(),
        }
    }
}

/// Durable record of stage runs.
#[derive(Debug)]
pub struct RunLedger {
    path: PathBuf,
    retention: usize,
    doc: LedgerDocument,
}

impl RunLedger {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Open the ledger at `path`, starting empty if it does not exist.
    ///
    /// Nothing is written until the first change.
    pub fn open(path: impl Into<PathBuf>, retention: usize) -> Result<Self> {
        let path = path.into();

        let doc = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| ReprunError::LedgerRead {
                path: path.clone(),
                message: e.to_string(),
            })?;
            serde_yaml::from_str(&content).map_err(|e| ReprunError::LedgerRead {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            LedgerDocument::default()
        };

        Ok(Self {
            path,
            retention: retention.max(1),
            doc,
        })
    }

    /// Open the ledger in a pipeline's state directory.
    pub fn open_in(state_dir: &Path, retention: usize) -> Result<Self> {
        Self::open(state_dir.join(LEDGER_FILE), retention)
    }

    /// Location of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a new run and persist it.
    pub fn begin_run(&mut self, run_id: RunId) -> Result<()> {
        self.entry_mut(run_id);
        self.prune(self.retention);
        self.save()
    }

    /// Persist a record, overwriting any earlier record for the same
    /// run and stage.
    pub fn record(&mut self, record: RunRecord) -> Result<()> {
        if record.status == StageStatus::Succeeded {
            self.doc
                .succeeded
                .insert(record.stage_name.clone(), record.clone());
        }
        self.entry_mut(record.run_id)
            .stages
            .insert(record.stage_name.clone(), record);
        self.save()
    }

    /// Mark a run finished and persist it.
    pub fn finish_run(&mut self, run_id: RunId, outcome: RunOutcome) -> Result<()> {
        let entry = self.entry_mut(run_id);
        entry.outcome = outcome;
        entry.finished_at = Some(Utc::now());
        self.save()
    }

    /// The last successful record for a stage.
    pub fn lookup(&self, stage_name: &str) -> Option<&RunRecord> {
        self.doc.succeeded.get(stage_name)
    }

    /// A run by id.
    pub fn run(&self, run_id: RunId) -> Option<&RunEntry> {
        self.doc.runs.iter().find(|r| r.run_id == run_id)
    }

    /// Run history, most recent first.
    pub fn runs(&self) -> &[RunEntry] {
        &self.doc.runs
    }

    /// Drop all but the `keep` most recent runs.
    ///
    /// The success index is untouched: it is what later runs resume from.
    pub fn prune(&mut self, keep: usize) {
        if self.doc.runs.len() > keep {
            self.doc.runs.truncate(keep);
        }
    }

    fn entry_mut(&mut self, run_id: RunId) -> &mut RunEntry {
        let index = match self.doc.runs.iter().position(|r| r.run_id == run_id) {
            Some(index) => index,
            None => {
                self.doc.runs.insert(0, RunEntry::new(run_id));
                0
            }
        };
        &mut self.doc.runs[index]
    }

    /// Write the ledger atomically and durably.
    fn save(&self) -> Result<()> {
        let write_error = |message: String| ReprunError::LedgerWrite {
            path: self.path.clone(),
            message,
        };

        let content = serde_yaml::to_string(&self.doc)
            .map_err(|e| write_error(format!("failed to serialize ledger: {}", e)))?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| write_error(e.to_string()))?;
        }

        let temp_path = self.path.with_extension("yml.tmp");
        let mut file = File::create(&temp_path).map_err(|e| write_error(e.to_string()))?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| write_error(e.to_string()))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| write_error(e.to_string()))?;
        sync_parent_dir(&self.path);

        Ok(())
    }
}

/// Flush the directory entry so the rename itself survives a crash.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(dir) = path.parent() {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            tracing::debug!("could not sync {}: {}", dir.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

/// A ledger shared between the scheduler and its workers.
///
/// Every write goes through one mutex, so concurrent stage completions are
/// serialized.
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<RunLedger>>,
}

impl SharedLedger {
    /// Wrap a ledger for shared use.
    pub fn new(ledger: RunLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Lock the ledger. A panicked writer leaves the in-memory document
    /// usable, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, RunLedger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist a record.
    pub fn record(&self, record: RunRecord) -> Result<()> {
        self.lock().record(record)
    }

    /// The last successful record for a stage.
    pub fn lookup(&self, stage_name: &str) -> Option<RunRecord> {
        self.lock().lookup(stage_name).cloned()
    }

    /// Unwrap the ledger once all other handles are gone.
    pub fn into_inner(self) -> Option<RunLedger> {
        Arc::try_unwrap(self.inner)
            .ok()
            .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}
