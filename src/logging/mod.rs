//! Per-run log sink.
//!
//! Every stage transition and every captured output line is appended to
//! `<state_dir>/reprun.log` as one line:
//!
//! ```text
//! 2026-01-01T12:00:00.000Z run_1767268800000_9f3c0a1b2c3d4e5f clean INFO exited with code 0
//! ```
//!
//! Events are mirrored to `tracing` at the same level. A failed write never
//! stops a stage: the sink is marked degraded and a single warning is
//! emitted.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::ReprunError;
use crate::state::RunId;

/// File name of the log inside the state directory.
pub const LOG_FILE: &str = "reprun.log";

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Structured, timestamped log shared by every stage of a run.
pub struct RunLog {
    run_id: RunId,
    sink: Mutex<Option<Box<dyn Write + Send>>>,
    degraded: AtomicBool,
}

impl RunLog {
    /// Append to the log file in `state_dir`.
    ///
    /// If the file cannot be opened the log starts degraded and only
    /// mirrors to `tracing`.
    pub fn open(state_dir: &Path, run_id: RunId) -> Self {
        let path = state_dir.join(LOG_FILE);
        let opened = fs::create_dir_all(state_dir).and_then(|()| {
            OpenOptions::new().create(true).append(true).open(&path)
        });

        match opened {
            Ok(file) => Self::with_writer(run_id, Box::new(file)),
            Err(e) => {
                let log = Self::mirror_only(run_id);
                log.degrade(format!("cannot open {}: {}", path.display(), e));
                log
            }
        }
    }

    /// Write to an arbitrary sink.
    pub fn with_writer(run_id: RunId, writer: Box<dyn Write + Send>) -> Self {
        Self {
            run_id,
            sink: Mutex::new(Some(writer)),
            degraded: AtomicBool::new(false),
        }
    }

    /// A log with no file, used when nothing may be written to disk.
    pub fn mirror_only(run_id: RunId) -> Self {
        Self {
            run_id,
            sink: Mutex::new(None),
            degraded: AtomicBool::new(false),
        }
    }

    /// Run this log belongs to.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Whether a write has failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Record a run-level event.
    pub fn run_event(&self, level: Level, message: &str) {
        self.write(None, level, message);
    }

    /// Record an event for one stage.
    pub fn stage_event(&self, stage: &str, level: Level, message: &str) {
        self.write(Some(stage), level, message);
    }

    fn write(&self, stage: Option<&str>, level: Level, message: &str) {
        mirror(self.run_id, stage, level, message);

        let line = format_line(Utc::now(), self.run_id, stage, level, message);
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(writer) = sink.as_mut() {
            let result = writer
                .write_all(line.as_bytes())
                .and_then(|()| writer.flush());
            if let Err(e) = result {
                *sink = None;
                drop(sink);
                self.degrade(e.to_string());
            }
        }
    }

    fn degrade(&self, message: String) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!("{}", ReprunError::LoggingDegraded { message });
        }
    }
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog")
            .field("run_id", &self.run_id)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

/// Format one log line, newline included.
pub fn format_line(
    timestamp: DateTime<Utc>,
    run_id: RunId,
    stage: Option<&str>,
    level: Level,
    message: &str,
) -> String {
    let message = message.replace(['\n', '\r'], " ");
    format!(
        "{} {} {} {} {}\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        run_id,
        stage.unwrap_or("-"),
        level,
        message
    )
}

fn mirror(run_id: RunId, stage: Option<&str>, level: Level, message: &str) {
    let stage = stage.unwrap_or("-");
    match level {
        Level::Debug => tracing::debug!(%run_id, stage, "{}", message),
        Level::Info => tracing::info!(%run_id, stage, "{}", message),
        Level::Warn => tracing::warn!(%run_id, stage, "{}", message),
        Level::Error => tracing::error!(%run_id, stage, "{}", message),
    }
}
