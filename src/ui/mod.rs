//! Terminal output.
//!
//! This module provides:
//! - [`UserInterface`] trait for UI abstraction
//! - [`TerminalUI`] writing styled output to the terminal
//! - [`MockUI`] capturing output for tests
//! - Tables and time formatting helpers
//!
//! # Example
//!
//! ```
//! use reprun::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.success("setup");
//! assert!(ui.has_success("setup"));
//! ```

pub mod format;
pub mod mock;
pub mod output;
pub mod table;
pub mod terminal;
pub mod theme;

pub use format::{format_chrono_duration, format_duration, format_relative_time, format_timestamp};
pub use mock::MockUI;
pub use output::OutputMode;
pub use table::Table;
pub use terminal::{create_ui, TerminalUI};
pub use theme::{should_use_colors, ReprunTheme};

use std::time::Duration;

use crate::state::StageStatus;

/// Trait for user interface interactions.
///
/// This trait allows mocking the UI in tests.
pub trait UserInterface {
    /// Get the current output mode.
    fn output_mode(&self) -> OutputMode;

    /// Display a message to the user.
    fn message(&mut self, msg: &str);

    /// Display a success message.
    fn success(&mut self, msg: &str);

    /// Display a warning message.
    fn warning(&mut self, msg: &str);

    /// Display an error message.
    fn error(&mut self, msg: &str);

    /// Display a skipped item.
    fn skipped(&mut self, msg: &str);

    /// Show a header/banner.
    fn show_header(&mut self, title: &str);

    /// Show a failed stage's command and the tail of its stderr.
    fn show_error_block(&mut self, command: &str, stderr_tail: &[String]);

    /// Show the end-of-run summary.
    fn show_run_summary(&mut self, summary: &RunSummary);
}

/// One line of a run summary.
#[derive(Debug, Clone)]
pub struct StageSummary {
    pub name: String,
    pub status: StageStatus,
    pub duration: Option<Duration>,
    pub detail: Option<String>,
}

/// End-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageSummary>,
    pub total_duration: Duration,
    pub stages_run: usize,
    pub stages_skipped: usize,
    pub success: bool,
}
