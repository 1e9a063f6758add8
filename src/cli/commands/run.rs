//! Run command implementation.
//!
//! The `reprun run` command executes a pipeline's stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cli::args::RunArgs;
use crate::error::{ReprunError, Result};
use crate::pipeline::Pipeline;
use crate::runner::{
    CancellationToken, ExecutionEngine, PlanAction, RunOptions, RunProgress, RunReport,
    STDERR_TAIL_LINES,
};
use crate::shell::{install_interrupt_handler, interrupted};
use crate::state::StageStatus;
use crate::ui::{RunSummary, StageSummary, UserInterface};

use super::dispatcher::{Command, CommandResult};

const SIGNAL_POLL: Duration = Duration::from_millis(50);

/// The run command implementation.
pub struct RunCommand {
    args: RunArgs,
    cancel: CancellationToken,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(args: RunArgs, cancel: CancellationToken) -> Self {
        Self { args, cancel }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    /// Build run options from args.
    fn build_options(&self) -> RunOptions {
        RunOptions {
            only: self.args.only.clone(),
            from: self.args.from.clone(),
            dry_run: self.args.dry_run,
            workers: usize::from(self.args.workers),
            force: self.args.force,
        }
    }

    fn show_progress(ui: &mut dyn UserInterface, progress: RunProgress<'_>) {
        match progress {
            RunProgress::StageStarting { name, index, total } => {
                ui.message(&format!("  [{}/{}] Running {}...", index, total, name));
            }
            RunProgress::StageAttemptFailed {
                name,
                attempt,
                max_attempts,
                reason,
            } => {
                ui.warning(&format!(
                    "  {} attempt {}/{} failed: {}, retrying",
                    name, attempt, max_attempts, reason
                ));
            }
            RunProgress::StageFinished { record } => match record.status {
                StageStatus::Succeeded => {
                    let attempts = if record.attempt_count > 1 {
                        format!(" after {} attempts", record.attempt_count)
                    } else {
                        String::new()
                    };
                    ui.success(&format!("  {}{}", record.stage_name, attempts));
                }
                _ => {
                    let reason = record.error.as_deref().unwrap_or("failed");
                    ui.error(&format!("  {}: {}", record.stage_name, reason));
                }
            },
            RunProgress::StageSkipped { name, reason } => {
                ui.skipped(&format!("  {} ({})", name, reason));
            }
            RunProgress::StageBlocked { name, reason } => {
                ui.warning(&format!("  {} not run: {}", name, reason));
            }
        }
    }

    fn show_plan(&self, ui: &mut dyn UserInterface, report: &RunReport) {
        for entry in &report.plan {
            match &entry.action {
                PlanAction::Run { reason } => {
                    ui.message(&format!("  would run {} ({})", entry.stage, reason));
                }
                PlanAction::Skip { reason } => {
                    ui.skipped(&format!("  {} ({})", entry.stage, reason));
                }
                PlanAction::Blocked { reason } => {
                    ui.warning(&format!("  {} blocked: {}", entry.stage, reason));
                }
            }
        }

        let runs = report
            .plan
            .iter()
            .filter(|e| matches!(e.action, PlanAction::Run { .. }))
            .count();
        let label = if runs == 1 { "stage" } else { "stages" };
        ui.message(&format!("Dry run: {} {} would run, nothing executed", runs, label));
    }

    fn summarize(report: &RunReport) -> RunSummary {
        let stages = report
            .records
            .iter()
            .map(|record| StageSummary {
                name: record.stage_name.clone(),
                status: record.status,
                duration: record.duration().and_then(|d| d.to_std().ok()),
                detail: record.error.clone(),
            })
            .collect();

        RunSummary {
            stages,
            total_duration: report.duration,
            stages_run: report.count(StageStatus::Succeeded) + report.count(StageStatus::Failed),
            stages_skipped: report.count(StageStatus::Skipped),
            success: report.success(),
        }
    }

    fn show_failure(&self, ui: &mut dyn UserInterface, pipeline: &Pipeline, report: &RunReport) {
        match report.error() {
            Some(ReprunError::Cancelled) => {
                ui.warning("Run cancelled; finished stages are recorded and will be skipped next time");
            }
            Some(err) => {
                ui.error(&err.to_string());
                if let Some(failure) = &report.failure {
                    let command = pipeline
                        .stage(&failure.stage)
                        .map(|stage| stage.command.to_string())
                        .unwrap_or_default();
                    let start = failure.stderr_tail.len().saturating_sub(STDERR_TAIL_LINES);
                    ui.show_error_block(&command, &failure.stderr_tail[start..]);
                }
            }
            None => ui.error("Run aborted: some selected stages could not run"),
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let pipeline = Pipeline::load(&self.args.pipeline)?;

        if self.args.dry_run {
            ui.show_header(&format!("Dry run of {}", pipeline.name()));
        } else {
            ui.show_header(&format!("Running {}", pipeline.name()));
        }

        let options = self.build_options();
        let engine = ExecutionEngine::new(&pipeline).with_cancellation(self.cancel.clone());

        let watcher = SignalWatcher::start(self.cancel.clone());
        let report = engine.run_with_progress(&options, |progress| {
            Self::show_progress(ui, progress);
        });
        drop(watcher);
        let report = report?;

        if report.dry_run {
            self.show_plan(ui, &report);
            return Ok(CommandResult::from_exit_code(report.exit_code()));
        }

        ui.show_run_summary(&Self::summarize(&report));
        if !report.success() {
            self.show_failure(ui, &pipeline, &report);
        }

        Ok(CommandResult::from_exit_code(report.exit_code()))
    }
}

/// Cancels a token when SIGINT or SIGTERM arrives.
struct SignalWatcher {
    done: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SignalWatcher {
    fn start(cancel: CancellationToken) -> Self {
        let done = Arc::new(AtomicBool::new(false));

        if let Err(e) = install_interrupt_handler() {
            tracing::warn!("cannot install signal handler: {}", e);
            return Self { done, handle: None };
        }

        let stop = Arc::clone(&done);
        let handle = thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                if interrupted() {
                    cancel.cancel("interrupted by signal");
                    break;
                }
                thread::sleep(SIGNAL_POLL);
            }
        });

        Self {
            done,
            handle: Some(handle),
        }
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
