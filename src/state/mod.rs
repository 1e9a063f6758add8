//! Run state: identifiers, stage records, change detection and the ledger.
//!
//! The [`RunLedger`] is the only persistent state. It is written through a
//! temporary file and renamed into place, and shared between threads as a
//! [`SharedLedger`].

pub mod change_detection;
pub mod ledger;
pub mod record;
pub mod run_id;

pub use change_detection::{hash_file, upstream_runs, ChangeDetector, ChangeStatus, Snapshot};
pub use ledger::{RunEntry, RunLedger, RunOutcome, SharedLedger, LEDGER_FILE};
pub use record::{PathHashes, RunRecord, StageStatus, UpstreamRuns};
pub use run_id::RunId;
