//! Pipeline execution.
//!
//! The [`ExecutionEngine`] walks a run through
//! `Initializing → Scheduling → Executing → Completed | Aborted`:
//!
//! 1. Resolve the stage selection, check required tools and open the ledger.
//!    Any failure here happens before a process launches or a record is
//!    written.
//! 2. In dependency order, skip stages whose last success still matches
//!    their files, and hand the rest to a pool of worker threads.
//! 3. Write each terminal record on the scheduling thread before any
//!    dependent is considered, and stop scheduling on the first failure.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ReprunError, Result, EXIT_STAGE_FAILED};
use crate::logging::{Level, RunLog};
use crate::pipeline::{check_requirements, parse_system_path, Pipeline, StageDescriptor};
use crate::shell::{execute_streaming, CommandOptions, OutputLine, Termination};
use crate::state::{
    upstream_runs, ChangeDetector, ChangeStatus, RunId, RunLedger, RunOutcome, RunRecord,
    SharedLedger, StageStatus,
};

use super::cancel::CancellationToken;

/// Lines of stderr kept for the failure summary.
pub const STDERR_TAIL_LINES: usize = 20;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Scheduling,
    Executing,
    Completed,
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Scheduling => "scheduling",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// Options for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Only run these stages. Entries may be comma-separated lists.
    pub only: Vec<String>,
    /// Run this stage and everything that depends on it.
    pub from: Option<String>,
    /// Report the plan without running or writing anything.
    pub dry_run: bool,
    /// Maximum stages running at once.
    pub workers: usize,
    /// Run stages even when their last success is still current.
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            only: Vec::new(),
            from: None,
            dry_run: false,
            workers: 1,
            force: false,
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug)]
pub enum RunProgress<'a> {
    /// A stage is about to launch.
    StageStarting {
        name: &'a str,
        index: usize,
        total: usize,
    },
    /// An attempt failed and the stage will be retried.
    StageAttemptFailed {
        name: &'a str,
        attempt: u32,
        max_attempts: u32,
        reason: &'a str,
    },
    /// A launched stage reached a terminal status.
    StageFinished { record: &'a RunRecord },
    /// A stage was skipped because its last success is current.
    StageSkipped { name: &'a str, reason: &'a str },
    /// A stage could not start because a dependency is unsatisfied.
    StageBlocked { name: &'a str, reason: &'a str },
}

/// What a dry run would do with a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Run { reason: String },
    Skip { reason: String },
    Blocked { reason: String },
}

impl PlanAction {
    /// Why this action was chosen.
    pub fn reason(&self) -> &str {
        match self {
            Self::Run { reason } | Self::Skip { reason } | Self::Blocked { reason } => reason,
        }
    }
}

/// One stage of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub stage: String,
    pub action: PlanAction,
}

/// The stage that stopped a run.
#[derive(Debug, Clone)]
pub struct StageFailure {
    /// Stage name.
    pub stage: String,
    /// Why the last attempt failed.
    pub reason: String,
    /// Last lines of the stage's stderr.
    pub stderr_tail: Vec<String>,
}

/// Result of a run.
#[derive(Debug)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Final state.
    pub state: RunState,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Terminal records in the order they were reached.
    pub records: Vec<RunRecord>,
    /// Dry-run plan, empty for real runs.
    pub plan: Vec<PlanEntry>,
    /// The stage that aborted the run.
    pub failure: Option<StageFailure>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Total duration.
    pub duration: Duration,
}

impl RunReport {
    /// Whether every selected stage succeeded or was skipped.
    pub fn success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Why the run stopped early, if it did.
    ///
    /// A cancelled run is [`ReprunError::Cancelled`] even when the stage it
    /// interrupted is also recorded as the failure.
    pub fn error(&self) -> Option<ReprunError> {
        if self.cancelled {
            return Some(ReprunError::Cancelled);
        }
        self.failure
            .as_ref()
            .map(|failure| ReprunError::StageExecution {
                stage: failure.stage.clone(),
                message: failure.reason.clone(),
            })
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        match self.error() {
            Some(err) => err.exit_code(),
            None if self.success() => 0,
            None => EXIT_STAGE_FAILED,
        }
    }

    /// Number of records with the given status.
    pub fn count(&self, status: StageStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Record of one stage, if it was reached.
    pub fn record(&self, stage: &str) -> Option<&RunRecord> {
        self.records.iter().find(|r| r.stage_name == stage)
    }
}

/// Runs a pipeline's stages.
pub struct ExecutionEngine<'a> {
    pipeline: &'a Pipeline,
    cancel: CancellationToken,
    path_entries: Vec<PathBuf>,
}

impl<'a> ExecutionEngine<'a> {
    /// Create an engine for a validated pipeline.
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self {
            pipeline,
            cancel: CancellationToken::new(),
            path_entries: parse_system_path(),
        }
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve required tools against these directories instead of `PATH`.
    pub fn with_path_entries(mut self, path_entries: Vec<PathBuf>) -> Self {
        self.path_entries = path_entries;
        self
    }

    /// Token that stops this engine's runs.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stages selected by `--only` and `--from`, in execution order.
    ///
    /// With both filters a stage must match each of them.
    pub fn select(&self, options: &RunOptions) -> Result<Vec<&'a StageDescriptor>> {
        let pipeline = self.pipeline;

        let mut only: Option<BTreeSet<String>> = None;
        for entry in &options.only {
            for name in entry.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                pipeline.require_stage(name)?;
                only.get_or_insert_with(BTreeSet::new).insert(name.to_string());
            }
        }

        let from = match &options.from {
            Some(name) => {
                pipeline.require_stage(name)?;
                let mut set = pipeline.graph().transitive_dependents(name);
                set.insert(name.clone());
                Some(set)
            }
            None => None,
        };

        Ok(pipeline
            .ordered_stages()
            .filter(|s| only.as_ref().map_or(true, |set| set.contains(&s.name)))
            .filter(|s| from.as_ref().map_or(true, |set| set.contains(&s.name)))
            .collect())
    }

    /// What a run with these options would do, without side effects.
    pub fn plan(&self, options: &RunOptions) -> Result<Vec<PlanEntry>> {
        let selected = self.select(options)?;
        let ledger = self.open_ledger()?;
        Ok(self.plan_with(&ledger, &selected, options.force))
    }

    /// Run the pipeline.
    pub fn run(&self, options: &RunOptions) -> Result<RunReport> {
        self.run_with_progress(options, |_| {})
    }

    /// Run the pipeline, reporting progress to a callback.
    ///
    /// Definition errors, missing requirements and ledger failures are
    /// returned as errors. A failed or cancelled stage is an `Ok` report
    /// with state [`RunState::Aborted`].
    pub fn run_with_progress(
        &self,
        options: &RunOptions,
        mut on_progress: impl FnMut(RunProgress<'_>),
    ) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = RunId::new();
        let mut state = RunState::Initializing;

        let selected = self.select(options)?;
        check_requirements(self.pipeline.requires(), &self.path_entries)?;
        let mut ledger = self.open_ledger()?;

        if options.dry_run {
            let plan = self.plan_with(&ledger, &selected, options.force);
            let blocked = plan
                .iter()
                .any(|p| matches!(p.action, PlanAction::Blocked { .. }));
            return Ok(RunReport {
                run_id,
                state: if blocked {
                    RunState::Aborted
                } else {
                    RunState::Completed
                },
                dry_run: true,
                records: Vec::new(),
                plan,
                failure: None,
                cancelled: false,
                duration: start.elapsed(),
            });
        }

        ledger.begin_run(run_id)?;
        let log = RunLog::open(self.pipeline.state_dir(), run_id);
        log.run_event(
            Level::Info,
            &format!(
                "run started for pipeline '{}': {} stage(s) selected, {} worker(s)",
                self.pipeline.name(),
                selected.len(),
                options.workers.max(1)
            ),
        );

        let mut schedule = Schedule::new(&selected, &ledger);
        let ledger = SharedLedger::new(ledger);
        let runner = StageRunner {
            workdir: self.pipeline.workdir(),
            ledger: ledger.clone(),
            log: &log,
            cancel: self.cancel.clone(),
        };

        transition(&mut state, RunState::Scheduling);
        let workers = options.workers.max(1);
        let total = selected.len();
        let (tx, rx) = mpsc::channel::<WorkerEvent>();

        thread::scope(|scope| {
            let mut in_flight = 0usize;
            let mut started = 0usize;

            loop {
                // Dispatch until nothing more can start
                let mut progressed = true;
                while progressed && !schedule.halted() && !self.cancel.is_cancelled() {
                    progressed = false;

                    for &stage in &selected {
                        if in_flight >= workers || schedule.halted() {
                            break;
                        }
                        if schedule.dispatched.contains(&stage.name) {
                            continue;
                        }

                        if !self.pipeline.graph().is_ready(&stage.name, &schedule.satisfied) {
                            if let Some(dep) = schedule.unsatisfiable_dependency(stage) {
                                schedule.block(stage, dep, run_id, &ledger, &log, &mut on_progress);
                                progressed = true;
                            }
                            continue;
                        }

                        schedule.dispatched.insert(stage.name.clone());
                        progressed = true;

                        if !options.force
                            && schedule.try_skip(self.pipeline, stage, run_id, &ledger, &log, &mut on_progress)
                        {
                            continue;
                        }

                        let mut record = RunRecord::pending(run_id, &stage.name);
                        record.upstream =
                            upstream_runs(stage, |dep| ledger.lookup(dep).map(|r| r.run_id));
                        if let Err(e) = ledger.record(record.clone()) {
                            schedule.ledger_error.get_or_insert(e);
                            break;
                        }

                        started += 1;
                        on_progress(RunProgress::StageStarting {
                            name: &stage.name,
                            index: started,
                            total,
                        });
                        transition(&mut state, RunState::Executing);

                        let tx = tx.clone();
                        let runner = &runner;
                        scope.spawn(move || {
                            let result = runner.execute_stage(stage, record, &tx);
                            let _ = tx.send(WorkerEvent::Finished(result));
                        });
                        in_flight += 1;
                    }
                }

                if in_flight == 0 {
                    break;
                }

                let event = match rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                };
                match event {
                    WorkerEvent::AttemptFailed {
                        stage,
                        attempt,
                        max_attempts,
                        reason,
                    } => on_progress(RunProgress::StageAttemptFailed {
                        name: &stage,
                        attempt,
                        max_attempts,
                        reason: &reason,
                    }),
                    WorkerEvent::Finished(result) => {
                        in_flight -= 1;
                        schedule.finish(result, &ledger, &mut on_progress);
                    }
                }
            }
        });

        let complete =
            !schedule.halted() && selected.iter().all(|s| schedule.satisfied.contains(&s.name));
        // A cancel that lands after the last stage finished stops nothing
        let cancelled = self.cancel.is_cancelled() && !complete;
        let final_state = if complete {
            RunState::Completed
        } else {
            RunState::Aborted
        };
        transition(&mut state, final_state);

        let outcome = if schedule.ledger_error.is_some() {
            RunOutcome::Aborted
        } else if cancelled {
            RunOutcome::Cancelled
        } else if state == RunState::Completed {
            RunOutcome::Completed
        } else {
            RunOutcome::Aborted
        };

        // Workers are joined, so this is the only handle left
        if let Err(e) = ledger.lock().finish_run(run_id, outcome) {
            schedule.ledger_error.get_or_insert(e);
        }

        if let Some(e) = schedule.ledger_error.take() {
            log.run_event(Level::Error, &format!("run aborted: {}", e));
            return Err(e);
        }

        let summary = match (&schedule.failure, cancelled) {
            (_, true) => format!("run cancelled: {}", self.cancel.reason().unwrap_or_default()),
            (Some(failure), false) => {
                format!("run aborted: stage '{}' {}", failure.stage, failure.reason)
            }
            (None, false) => format!("run {}", state),
        };
        let level = if state == RunState::Completed {
            Level::Info
        } else {
            Level::Error
        };
        log.run_event(level, &summary);

        Ok(RunReport {
            run_id,
            state,
            dry_run: false,
            records: schedule.records,
            plan: Vec::new(),
            failure: schedule.failure,
            cancelled,
            duration: start.elapsed(),
        })
    }

    fn open_ledger(&self) -> Result<RunLedger> {
        RunLedger::open_in(self.pipeline.state_dir(), self.pipeline.history_retention())
    }

    fn plan_with(
        &self,
        ledger: &RunLedger,
        selected: &[&StageDescriptor],
        force: bool,
    ) -> Vec<PlanEntry> {
        let detector = ChangeDetector::new(self.pipeline.workdir());
        let names: BTreeSet<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        let mut will_run: BTreeSet<&str> = BTreeSet::new();
        let mut blocked: BTreeSet<&str> = BTreeSet::new();
        let mut plan = Vec::with_capacity(selected.len());

        for stage in selected {
            let deps = stage.depends_on.iter().map(String::as_str);

            let action = if let Some(dep) = deps
                .clone()
                .find(|d| blocked.contains(d) || (!names.contains(d) && ledger.lookup(d).is_none()))
            {
                blocked.insert(&stage.name);
                PlanAction::Blocked {
                    reason: format!("dependency '{}' not satisfied", dep),
                }
            } else if force {
                PlanAction::Run {
                    reason: "forced".to_string(),
                }
            } else if let Some(dep) = deps.clone().find(|d| will_run.contains(d)) {
                PlanAction::Run {
                    reason: format!("dependency '{}' will run", dep),
                }
            } else {
                let upstream = upstream_runs(stage, |dep| ledger.lookup(dep).map(|r| r.run_id));
                match detector.check_stage(stage, ledger.lookup(&stage.name), &upstream) {
                    ChangeStatus::Current { .. } => PlanAction::Skip {
                        reason: "up to date".to_string(),
                    },
                    ChangeStatus::NeverRun => PlanAction::Run {
                        reason: "no successful run recorded".to_string(),
                    },
                    ChangeStatus::Stale { reason } => PlanAction::Run { reason },
                }
            };

            if matches!(action, PlanAction::Run { .. }) {
                will_run.insert(&stage.name);
            }
            plan.push(PlanEntry {
                stage: stage.name.clone(),
                action,
            });
        }

        plan
    }
}

fn transition(state: &mut RunState, next: RunState) {
    if *state != next {
        tracing::debug!("run state: {} -> {}", state, next);
        *state = next;
    }
}

/// Scheduler bookkeeping, owned by the scheduling thread.
struct Schedule {
    selected: BTreeSet<String>,
    /// Stages whose dependents may start.
    satisfied: BTreeSet<String>,
    /// Stages that ran (rather than skipped) in this run.
    executed: BTreeSet<String>,
    dispatched: BTreeSet<String>,
    records: Vec<RunRecord>,
    failure: Option<StageFailure>,
    ledger_error: Option<ReprunError>,
}

impl Schedule {
    fn new(selected: &[&StageDescriptor], ledger: &RunLedger) -> Self {
        let names: BTreeSet<String> = selected.iter().map(|s| s.name.clone()).collect();

        // Dependencies outside the selection count only if they succeeded before
        let satisfied = selected
            .iter()
            .flat_map(|s| s.depends_on.iter())
            .filter(|d| !names.contains(*d) && ledger.lookup(d).is_some())
            .cloned()
            .collect();

        Self {
            selected: names,
            satisfied,
            executed: BTreeSet::new(),
            dispatched: BTreeSet::new(),
            records: Vec::new(),
            failure: None,
            ledger_error: None,
        }
    }

    fn halted(&self) -> bool {
        self.failure.is_some() || self.ledger_error.is_some()
    }

    fn unsatisfiable_dependency<'s>(&self, stage: &'s StageDescriptor) -> Option<&'s str> {
        stage
            .depends_on
            .iter()
            .find(|d| !self.selected.contains(*d) && !self.satisfied.contains(*d))
            .map(String::as_str)
    }

    fn block(
        &mut self,
        stage: &StageDescriptor,
        dependency: &str,
        run_id: RunId,
        ledger: &SharedLedger,
        log: &RunLog,
        on_progress: &mut impl FnMut(RunProgress<'_>),
    ) {
        self.dispatched.insert(stage.name.clone());
        let reason = format!("dependency '{}' not satisfied", dependency);

        let mut record = RunRecord::pending(run_id, &stage.name);
        record.fail(None, reason.clone());
        log.stage_event(&stage.name, Level::Error, &reason);
        if let Err(e) = ledger.record(record.clone()) {
            self.ledger_error.get_or_insert(e);
        }

        on_progress(RunProgress::StageBlocked {
            name: &stage.name,
            reason: &reason,
        });
        self.records.push(record);
        self.failure.get_or_insert(StageFailure {
            stage: stage.name.clone(),
            reason,
            stderr_tail: Vec::new(),
        });
    }

    /// Record a skip if the stage's last success still matches. A stage
    /// never skips after one of its dependencies succeeded again, in this
    /// run or in an earlier one that stopped before reaching it.
    fn try_skip(
        &mut self,
        pipeline: &Pipeline,
        stage: &StageDescriptor,
        run_id: RunId,
        ledger: &SharedLedger,
        log: &RunLog,
        on_progress: &mut impl FnMut(RunProgress<'_>),
    ) -> bool {
        if stage.depends_on.iter().any(|d| self.executed.contains(d)) {
            return false;
        }

        let prior = ledger.lookup(&stage.name);
        let upstream = upstream_runs(stage, |dep| ledger.lookup(dep).map(|r| r.run_id));
        let detector = ChangeDetector::new(pipeline.workdir());
        let (inputs, outputs) = match detector.check_stage(stage, prior.as_ref(), &upstream) {
            ChangeStatus::Current { inputs, outputs } => (inputs, outputs),
            ChangeStatus::NeverRun => return false,
            ChangeStatus::Stale { reason } => {
                log.stage_event(&stage.name, Level::Info, &format!("stale: {}", reason));
                return false;
            }
        };

        let mut record = RunRecord::pending(run_id, &stage.name);
        record.skip(inputs, outputs);
        record.upstream = upstream;
        if let Err(e) = ledger.record(record.clone()) {
            self.ledger_error.get_or_insert(e);
            return true;
        }

        let reason = "up to date";
        log.stage_event(&stage.name, Level::Info, &format!("skipped: {}", reason));
        on_progress(RunProgress::StageSkipped {
            name: &stage.name,
            reason,
        });
        self.satisfied.insert(stage.name.clone());
        self.records.push(record);
        true
    }

    /// Write a worker's terminal record, then release its dependents.
    fn finish(
        &mut self,
        result: StageResult,
        ledger: &SharedLedger,
        on_progress: &mut impl FnMut(RunProgress<'_>),
    ) {
        let StageResult {
            record,
            stderr_tail,
            ledger_error,
        } = result;

        if let Some(e) = ledger_error {
            self.ledger_error.get_or_insert(e);
        }
        if let Err(e) = ledger.record(record.clone()) {
            self.ledger_error.get_or_insert(e);
        }

        match record.status {
            StageStatus::Succeeded if self.ledger_error.is_none() => {
                self.satisfied.insert(record.stage_name.clone());
                self.executed.insert(record.stage_name.clone());
            }
            StageStatus::Failed => {
                self.failure.get_or_insert(StageFailure {
                    stage: record.stage_name.clone(),
                    reason: record.error.clone().unwrap_or_default(),
                    stderr_tail,
                });
            }
            _ => {}
        }

        on_progress(RunProgress::StageFinished { record: &record });
        self.records.push(record);
    }
}

enum WorkerEvent {
    AttemptFailed {
        stage: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },
    Finished(StageResult),
}

struct StageResult {
    record: RunRecord,
    stderr_tail: Vec<String>,
    ledger_error: Option<ReprunError>,
}

/// Everything a worker thread needs to run one stage.
struct StageRunner<'r> {
    workdir: &'r Path,
    ledger: SharedLedger,
    log: &'r RunLog,
    cancel: CancellationToken,
}

impl StageRunner<'_> {
    fn execute_stage(
        &self,
        stage: &StageDescriptor,
        mut record: RunRecord,
        events: &Sender<WorkerEvent>,
    ) -> StageResult {
        let name = stage.name.as_str();
        let detector = ChangeDetector::new(self.workdir);
        let options = CommandOptions {
            cwd: Some(self.workdir.to_path_buf()),
            env: stage.env.clone(),
            timeout: stage.timeout,
            cancel: Some(self.cancel.clone()),
        };
        let mut stderr_tail = Vec::new();

        for attempt in 1..=stage.max_attempts {
            if self.cancel.is_cancelled() {
                record.fail(None, "cancelled");
                break;
            }

            let inputs = detector.snapshot(&stage.inputs);
            for path in &inputs.missing {
                self.log
                    .stage_event(name, Level::Warn, &format!("input {} is missing", path));
            }
            record.start_attempt(inputs.hashes);
            if let Err(e) = self.ledger.record(record.clone()) {
                return StageResult {
                    record,
                    stderr_tail,
                    ledger_error: Some(e),
                };
            }

            self.log.stage_event(
                name,
                Level::Info,
                &format!("attempt {}/{}: {}", attempt, stage.max_attempts, stage.command),
            );

            let outcome = execute_streaming(&stage.command, &options, &mut |line| match line {
                OutputLine::Stdout(text) => {
                    self.log.stage_event(name, Level::Info, &format!("stdout: {}", text))
                }
                OutputLine::Stderr(text) => {
                    self.log.stage_event(name, Level::Info, &format!("stderr: {}", text))
                }
            });

            let (exit_code, reason) = match outcome {
                Err(e) => (None, format!("failed to launch: {}", e)),
                Ok(result) => {
                    stderr_tail = result.stderr_tail(STDERR_TAIL_LINES);

                    if result.termination == Some(Termination::Cancelled) {
                        self.log.stage_event(name, Level::Error, "cancelled");
                        record.fail(result.exit_code, "cancelled");
                        break;
                    }

                    if result.success {
                        let outputs = detector.snapshot(&stage.outputs);
                        if outputs.is_complete() {
                            self.log.stage_event(
                                name,
                                Level::Info,
                                &format!("succeeded in {:.1}s", result.duration.as_secs_f64()),
                            );
                            record.succeed(result.exit_code, outputs.hashes);
                            break;
                        }
                        (
                            result.exit_code,
                            format!(
                                "declared output not produced: {}",
                                outputs.missing.join(", ")
                            ),
                        )
                    } else {
                        (result.exit_code, result.failure_reason(stage.timeout))
                    }
                }
            };

            if attempt < stage.max_attempts {
                self.log.stage_event(
                    name,
                    Level::Warn,
                    &format!("attempt {}/{} failed: {}", attempt, stage.max_attempts, reason),
                );
                let _ = events.send(WorkerEvent::AttemptFailed {
                    stage: stage.name.clone(),
                    attempt,
                    max_attempts: stage.max_attempts,
                    reason,
                });
            } else {
                self.log.stage_event(
                    name,
                    Level::Error,
                    &format!("failed after {} attempt(s): {}", attempt, reason),
                );
                record.fail(exit_code, reason);
            }
        }

        StageResult {
            record,
            stderr_tail,
            ledger_error: None,
        }
    }
}
