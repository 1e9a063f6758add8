//! Stage process execution.
//!
//! Commands run with stdin closed and both output streams captured line by
//! line. Each line is handed to a callback as it arrives so it can be logged
//! while the process is still running. The child is polled so a timeout or a
//! cancellation request can stop it: first politely with SIGTERM to its
//! process group, then with SIGKILL after a grace period.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::pipeline::StageCommand;
use crate::runner::CancellationToken;

use super::platform::{detect_shell, shell_flag};

/// How often a running child is checked for exit, timeout and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// How long to keep reading output after the child exits.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Why a command was stopped before it exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The per-attempt time limit elapsed.
    TimedOut,
    /// Cancellation was requested.
    Cancelled,
}

/// Result of executing a command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether command succeeded (exit code 0).
    pub success: bool,

    /// Set when the runner stopped the command.
    pub termination: Option<Termination>,

    /// Signal that ended the process, on Unix.
    pub signal: Option<i32>,
}

impl CommandResult {
    fn from_status(status: ExitStatus, duration: Duration) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            exit_code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
            duration,
            success: status.success(),
            termination: None,
            signal,
        }
    }

    /// A one-line reason for a failed result.
    pub fn failure_reason(&self, timeout: Option<Duration>) -> String {
        match (self.termination, self.exit_code, self.signal) {
            (Some(Termination::TimedOut), _, _) => match timeout {
                Some(limit) => format!("timed out after {}s", limit.as_secs()),
                None => "timed out".to_string(),
            },
            (Some(Termination::Cancelled), _, _) => "cancelled".to_string(),
            (None, Some(code), _) => format!("exited with code {}", code),
            (None, None, Some(signal)) => format!("terminated by signal {}", signal),
            (None, None, None) => "terminated".to_string(),
        }
    }

    /// The last `lines` lines of standard error.
    pub fn stderr_tail(&self, lines: usize) -> Vec<String> {
        let all: Vec<&str> = self.stderr.lines().collect();
        let skip = all.len().saturating_sub(lines);
        all[skip..].iter().map(|l| l.to_string()).collect()
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables (merged with system env).
    pub env: BTreeMap<String, String>,

    /// Wall-clock limit.
    pub timeout: Option<Duration>,

    /// Stops the command when cancelled.
    pub cancel: Option<CancellationToken>,
}

/// Output line from command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Execute a command, collecting its output.
pub fn execute(command: &StageCommand, options: &CommandOptions) -> io::Result<CommandResult> {
    execute_streaming(command, options, &mut |_| {})
}

/// Execute a command, passing every output line to `on_line` as it arrives.
///
/// An error means the process could not be launched or waited on. A process
/// that ran and failed is an `Ok` result with `success == false`.
pub fn execute_streaming(
    command: &StageCommand,
    options: &CommandOptions,
    on_line: &mut dyn FnMut(OutputLine),
) -> io::Result<CommandResult> {
    let mut cmd = build_command(command)?;

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&options.env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    // Own process group so termination reaches grandchildren too
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    tracing::debug!("launched pid {} for {}", child.id(), command);

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone(), OutputLine::Stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx, OutputLine::Stderr);
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut handle_line = |line: OutputLine| {
        match &line {
            OutputLine::Stdout(text) => push_line(&mut stdout, text),
            OutputLine::Stderr(text) => push_line(&mut stderr, text),
        }
        on_line(line);
    };

    let mut streams_open = true;
    let mut termination = None;
    let mut kill_at: Option<Instant> = None;

    let status = loop {
        if streams_open {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => handle_line(line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => streams_open = false,
            }
        } else {
            thread::sleep(POLL_INTERVAL);
        }

        if let Some(status) = child.try_wait()? {
            break status;
        }

        if termination.is_none() {
            if options.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                termination = Some(Termination::Cancelled);
            } else if options.timeout.is_some_and(|limit| start.elapsed() >= limit) {
                termination = Some(Termination::TimedOut);
            }
            if let Some(reason) = termination {
                tracing::debug!("stopping pid {} ({:?})", child.id(), reason);
                terminate(&mut child);
                kill_at = Some(Instant::now() + KILL_GRACE);
            }
        } else if kill_at.is_some_and(|at| Instant::now() >= at) {
            force_kill(&mut child);
            kill_at = None;
        }
    };

    let drain_deadline = Instant::now() + DRAIN_GRACE;
    while streams_open {
        let remaining = drain_deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) => handle_line(line),
            Err(RecvTimeoutError::Disconnected) => streams_open = false,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("output of {} still open after exit, detaching", command);
                break;
            }
        }
    }

    let mut result = CommandResult::from_status(status, start.elapsed());
    result.stdout = stdout;
    result.stderr = stderr;
    if termination.is_some() {
        result.termination = termination;
        result.success = false;
    }
    Ok(result)
}

fn build_command(command: &StageCommand) -> io::Result<Command> {
    match command {
        StageCommand::Argv(argv) => {
            let (program, args) = argv.split_first().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "empty command")
            })?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            Ok(cmd)
        }
        StageCommand::Shell(script) => {
            let mut cmd = Command::new(detect_shell());
            cmd.arg(shell_flag()).arg(script);
            Ok(cmd)
        }
    }
}

fn spawn_reader<R>(stream: R, tx: Sender<OutputLine>, wrap: fn(String) -> OutputLine)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(std::result::Result::ok) {
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    });
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    if !super::platform::signal_process_group(child.id(), libc::SIGTERM) {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    if !super::platform::signal_process_group(child.id(), libc::SIGKILL) {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    let _ = child.kill();
}
