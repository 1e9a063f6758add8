//! Status command implementation.
//!
//! The `reprun status` command shows, for every stage, its last successful
//! run and whether that success still matches the files on disk.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::args::StatusArgs;
use crate::error::{ReprunError, Result};
use crate::pipeline::Pipeline;
use crate::state::{upstream_runs, ChangeDetector, ChangeStatus, RunId, RunLedger};
use crate::ui::{format_relative_time, Table, UserInterface};

use super::dispatcher::{Command, CommandResult};

/// Freshness of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageState {
    pub stage: String,
    /// `current`, `stale` or `never_run`.
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The status command implementation.
pub struct StatusCommand {
    args: StatusArgs,
}

impl StatusCommand {
    /// Create a new status command.
    pub fn new(args: StatusArgs) -> Self {
        Self { args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &StatusArgs {
        &self.args
    }

    /// Compute the state of every stage in execution order.
    pub fn collect(pipeline: &Pipeline, ledger: &RunLedger) -> Vec<StageState> {
        let detector = ChangeDetector::new(pipeline.workdir());

        pipeline
            .ordered_stages()
            .map(|stage| {
                let prior = ledger.lookup(&stage.name);
                let upstream = upstream_runs(stage, |dep| ledger.lookup(dep).map(|r| r.run_id));
                let (state, reason) = match detector.check_stage(stage, prior, &upstream) {
                    ChangeStatus::NeverRun => ("never_run", None),
                    ChangeStatus::Current { .. } => ("current", None),
                    ChangeStatus::Stale { reason } => ("stale", Some(reason)),
                };

                StageState {
                    stage: stage.name.clone(),
                    state,
                    last_success: prior.and_then(|r| r.finished_at),
                    run_id: prior.map(|r| r.run_id),
                    reason,
                }
            })
            .collect()
    }
}

impl Command for StatusCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let pipeline = Pipeline::load(&self.args.pipeline)?;
        let ledger = RunLedger::open_in(pipeline.state_dir(), pipeline.history_retention())?;
        let states = Self::collect(&pipeline, &ledger);

        if self.args.json {
            let json =
                serde_json::to_string_pretty(&states).map_err(|e| ReprunError::Other(e.into()))?;
            ui.message(&json);
            return Ok(CommandResult::success());
        }

        ui.show_header(&format!("{} status", pipeline.name()));

        let mut table = Table::new(&["Stage", "State", "Last success", "Detail"]);
        for state in &states {
            table.add_row([
                state.stage.clone(),
                state.state.replace('_', " "),
                state
                    .last_success
                    .map(format_relative_time)
                    .unwrap_or_else(|| "-".to_string()),
                state.reason.clone().unwrap_or_default(),
            ]);
        }
        ui.message(&table.render());

        let current = states.iter().filter(|s| s.state == "current").count();
        let message = format!("{} of {} stages current", current, states.len());
        if current == states.len() {
            ui.success(&message);
        } else {
            ui.warning(&message);
        }

        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunRecord, LEDGER_FILE};
    use crate::ui::MockUI;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const PIPELINE: &str = r#"
stages:
  - name: setup
    command: ["true"]
  - name: clean
    command: ["true"]
    inputs: [raw.csv]
    depends_on: [setup]
"#;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("pipeline.yml"), PIPELINE).unwrap();
        fs::write(temp.path().join("raw.csv"), "id,wage\n").unwrap();
        temp
    }

    fn record_success(dir: &Path, stage: &str, inputs: &[&str]) {
        let pipeline = Pipeline::load(&dir.join("pipeline.yml")).unwrap();
        let mut ledger = RunLedger::open_in(pipeline.state_dir(), 10).unwrap();
        let run_id = RunId::new();
        ledger.begin_run(run_id).unwrap();

        let detector = ChangeDetector::new(pipeline.workdir());
        let inputs: Vec<_> = inputs.iter().map(std::path::PathBuf::from).collect();
        let mut record = RunRecord::pending(run_id, stage);
        if let Some(descriptor) = pipeline.stage(stage) {
            record.upstream =
                upstream_runs(descriptor, |dep| ledger.lookup(dep).map(|r| r.run_id));
        }
        record.start_attempt(detector.snapshot(&inputs).hashes);
        record.succeed(Some(0), BTreeMap::new());
        ledger.record(record).unwrap();
    }

    fn status(dir: &Path, json: bool) -> MockUI {
        let mut ui = MockUI::new();
        let cmd = StatusCommand::new(StatusArgs {
            pipeline: dir.join("pipeline.yml"),
            json,
        });
        assert!(cmd.execute(&mut ui).unwrap().success);
        ui
    }

    #[test]
    fn fresh_pipeline_has_nothing_current() {
        let temp = project();
        let ui = status(temp.path(), false);

        assert!(ui.has_message("never run"));
        assert!(ui.has_warning("0 of 2 stages current"));
        assert!(!temp.path().join(".reprun").join(LEDGER_FILE).exists());
    }

    #[test]
    fn changed_input_is_stale() {
        let temp = project();
        record_success(temp.path(), "setup", &[]);
        record_success(temp.path(), "clean", &["raw.csv"]);
        fs::write(temp.path().join("raw.csv"), "id,wage\n1,12\n").unwrap();

        let pipeline = Pipeline::load(&temp.path().join("pipeline.yml")).unwrap();
        let ledger = RunLedger::open_in(pipeline.state_dir(), 10).unwrap();
        let states = StatusCommand::collect(&pipeline, &ledger);

        assert_eq!(states[0].state, "current");
        assert_eq!(states[1].state, "stale");
        assert!(states[1].reason.as_deref().unwrap().contains("raw.csv"));
    }

    #[test]
    fn dependency_success_after_dependent_is_stale() {
        let temp = project();
        record_success(temp.path(), "setup", &[]);
        record_success(temp.path(), "clean", &["raw.csv"]);
        // setup succeeds again in a run that stopped before clean
        record_success(temp.path(), "setup", &[]);

        let pipeline = Pipeline::load(&temp.path().join("pipeline.yml")).unwrap();
        let ledger = RunLedger::open_in(pipeline.state_dir(), 10).unwrap();
        let states = StatusCommand::collect(&pipeline, &ledger);

        assert_eq!(states[0].state, "current");
        assert_eq!(states[1].state, "stale");
        assert_eq!(states[1].reason.as_deref(), Some("dependency setup ran since"));
    }

    #[test]
    fn dependent_recorded_after_dependency_is_current() {
        let temp = project();
        record_success(temp.path(), "setup", &[]);
        record_success(temp.path(), "clean", &["raw.csv"]);

        let pipeline = Pipeline::load(&temp.path().join("pipeline.yml")).unwrap();
        let ledger = RunLedger::open_in(pipeline.state_dir(), 10).unwrap();
        let states = StatusCommand::collect(&pipeline, &ledger);

        assert!(states.iter().all(|s| s.state == "current"));
    }

    #[test]
    fn json_output_is_parseable() {
        let temp = project();
        record_success(temp.path(), "setup", &[]);

        let ui = status(temp.path(), true);
        let value: serde_json::Value = serde_json::from_str(&ui.messages()[0]).unwrap();
        let stages = value.as_array().unwrap();

        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0]["stage"], "setup");
        assert_eq!(stages[0]["state"], "current");
        assert_eq!(stages[1]["state"], "never_run");
        assert!(stages[1].get("last_success").is_none());
    }
}
