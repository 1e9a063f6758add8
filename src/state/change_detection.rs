//! Change detection for stage inputs and outputs.
//!
//! This module provides the [`ChangeDetector`] for checking whether a stage
//! still matches its last successful run, and the [`ChangeStatus`] enum for
//! representing the result. Files are compared by SHA-256 of their content,
//! dependencies by the run of their latest success.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::pipeline::StageDescriptor;

use super::{PathHashes, RunId, RunRecord, UpstreamRuns};

/// Status of a stage relative to its last successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeStatus {
    /// Stage has never succeeded.
    NeverRun,

    /// Inputs and outputs match the last successful run.
    Current {
        /// Current input hashes.
        inputs: PathHashes,
        /// Current output hashes.
        outputs: PathHashes,
    },

    /// Something changed since the last successful run.
    Stale {
        /// What changed.
        reason: String,
    },
}

impl ChangeStatus {
    /// Whether the stage can be skipped.
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Current { .. })
    }
}

/// Hashes of a set of declared files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Hashes of the files that could be read, keyed by declared path.
    pub hashes: PathHashes,
    /// Declared paths that are missing or unreadable.
    pub missing: Vec<String>,
}

impl Snapshot {
    /// Whether every declared file was hashed.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compares declared files against ledger records.
pub struct ChangeDetector<'a> {
    workdir: &'a Path,
}

impl<'a> ChangeDetector<'a> {
    /// Create a detector resolving relative paths against `workdir`.
    pub fn new(workdir: &'a Path) -> Self {
        Self { workdir }
    }

    /// Hash every declared path.
    pub fn snapshot(&self, declared: &[PathBuf]) -> Snapshot {
        let mut snapshot = Snapshot::default();

        for path in declared {
            let key = path.to_string_lossy().to_string();
            let full_path = self.resolve(path);
            match hash_file(&full_path) {
                Ok(hash) => {
                    snapshot.hashes.insert(key, hash);
                }
                Err(e) => {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!("cannot read {}: {}", full_path.display(), e);
                    }
                    snapshot.missing.push(key);
                }
            }
        }

        snapshot
    }

    /// Compare a stage's files with its last successful record, then the
    /// latest dependency successes in `upstream` with the ones it ran after.
    pub fn check_stage(
        &self,
        stage: &StageDescriptor,
        prior: Option<&RunRecord>,
        upstream: &UpstreamRuns,
    ) -> ChangeStatus {
        let prior = match prior {
            Some(record) => record,
            None => return ChangeStatus::NeverRun,
        };

        let inputs = self.snapshot(&stage.inputs);
        if let Some(path) = inputs.missing.first() {
            return ChangeStatus::Stale {
                reason: format!("input {} is missing", path),
            };
        }
        if let Some(path) = first_difference(&prior.input_hashes, &inputs.hashes) {
            return ChangeStatus::Stale {
                reason: format!("input {} changed", path),
            };
        }

        let outputs = self.snapshot(&stage.outputs);
        if let Some(path) = outputs.missing.first() {
            return ChangeStatus::Stale {
                reason: format!("output {} is missing", path),
            };
        }
        if let Some(path) = first_difference(&prior.output_hashes, &outputs.hashes) {
            return ChangeStatus::Stale {
                reason: format!("output {} changed", path),
            };
        }

        if let Some(dep) = first_difference(&prior.upstream, upstream) {
            return ChangeStatus::Stale {
                reason: format!("dependency {} ran since", dep),
            };
        }

        ChangeStatus::Current {
            inputs: inputs.hashes,
            outputs: outputs.hashes,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}

/// SHA-256 of a file's content, hex encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let digest = hasher.finalize();
    Ok(hex::encode(&digest[..]))
}

/// Latest successful run of each of a stage's dependencies.
pub fn upstream_runs(
    stage: &StageDescriptor,
    latest_success: impl Fn(&str) -> Option<RunId>,
) -> UpstreamRuns {
    stage
        .depends_on
        .iter()
        .filter_map(|dep| latest_success(dep).map(|run_id| (dep.clone(), run_id)))
        .collect()
}

/// The first key whose value differs between two maps, including keys
/// present in only one of them.
fn first_difference<V: PartialEq>(
    recorded: &BTreeMap<String, V>,
    current: &BTreeMap<String, V>,
) -> Option<String> {
    recorded
        .keys()
        .chain(current.keys())
        .find(|path| recorded.get(*path) != current.get(*path))
        .cloned()
}
