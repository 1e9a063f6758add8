//! History command implementation.
//!
//! The `reprun history` command shows runs recorded in the ledger.

use crate::cli::args::HistoryArgs;
use crate::error::{ReprunError, Result};
use crate::pipeline::Pipeline;
use crate::state::{RunEntry, RunLedger, RunOutcome, StageStatus};
use crate::ui::{format_chrono_duration, format_relative_time, format_timestamp, UserInterface};

use super::dispatcher::{Command, CommandResult};

/// Runs shown when `--limit` is not given.
const DEFAULT_LIMIT: usize = 10;

/// The history command implementation.
pub struct HistoryCommand {
    args: HistoryArgs,
}

impl HistoryCommand {
    /// Create a new history command.
    pub fn new(args: HistoryArgs) -> Self {
        Self { args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &HistoryArgs {
        &self.args
    }

    /// Format a single run entry line.
    fn format_run_line(run: &RunEntry) -> String {
        let status = match run.outcome {
            RunOutcome::Completed => "[ok]",
            RunOutcome::Aborted => "[FAIL]",
            RunOutcome::Cancelled => "[int]",
            RunOutcome::InProgress => "[...]",
        };

        let ran = run.count(StageStatus::Succeeded) + run.count(StageStatus::Failed);
        let skipped = run.count(StageStatus::Skipped);
        let duration = run
            .finished_at
            .map(|end| format!(", {}", format_chrono_duration(end - run.started_at)))
            .unwrap_or_default();

        format!(
            "{} {} ({}) {} - {} run, {} skipped{}",
            status,
            format_relative_time(run.started_at),
            format_timestamp(run.started_at),
            run.run_id,
            ran,
            skipped,
            duration
        )
    }

    /// Show per-stage statuses of a run.
    fn show_run_detail(ui: &mut dyn UserInterface, pipeline: &Pipeline, run: &RunEntry) {
        // Pipeline order first, then stages no longer in the definition.
        let known = pipeline
            .order()
            .iter()
            .filter_map(|name| run.stages.get(name));
        let removed = run
            .stages
            .values()
            .filter(|r| pipeline.stage(&r.stage_name).is_none());

        for record in known.chain(removed) {
            let mut line = format!(
                "    {} {} {}",
                record.status.display_char(),
                record.stage_name,
                record.status
            );
            if record.attempt_count > 1 {
                line.push_str(&format!(" ({} attempts)", record.attempt_count));
            }
            if let Some(error) = &record.error {
                line.push_str(&format!(": {}", error));
            }
            ui.message(&line);
        }
    }
}

impl Command for HistoryCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let pipeline = Pipeline::load(&self.args.pipeline)?;
        let ledger = RunLedger::open_in(pipeline.state_dir(), pipeline.history_retention())?;

        let limit = self.args.limit.unwrap_or(DEFAULT_LIMIT);
        let runs: Vec<&RunEntry> = ledger.runs().iter().take(limit).collect();

        if self.args.json {
            let json =
                serde_json::to_string_pretty(&runs).map_err(|e| ReprunError::Other(e.into()))?;
            ui.message(&json);
            return Ok(CommandResult::success());
        }

        if runs.is_empty() {
            ui.message("No runs recorded for this pipeline.");
            return Ok(CommandResult::success());
        }

        ui.show_header("Run History");
        for run in &runs {
            ui.message(&Self::format_run_line(run));
            Self::show_run_detail(ui, &pipeline, run);
        }

        let total = ledger.runs().len();
        if total > runs.len() {
            ui.message(&format!("Showing {} of {} runs", runs.len(), total));
        }

        Ok(CommandResult::success())
    }
}
