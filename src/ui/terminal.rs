//! Terminal UI.

use console::Term;
use std::io::Write;

use super::format::format_duration;
use super::{should_use_colors, OutputMode, ReprunTheme, RunSummary, UserInterface};

/// Styled terminal output. Progress goes to stdout, problems to stderr.
pub struct TerminalUI {
    out: Term,
    err: Term,
    theme: ReprunTheme,
    mode: OutputMode,
}

impl TerminalUI {
    /// Create a new terminal UI.
    pub fn new(mode: OutputMode) -> Self {
        let theme = if should_use_colors() {
            ReprunTheme::new()
        } else {
            ReprunTheme::plain()
        };

        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            theme,
            mode,
        }
    }
}

impl UserInterface for TerminalUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "{}", msg).ok();
        }
    }

    fn success(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "{}", self.theme.format_success(msg)).ok();
        }
    }

    fn warning(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.err, "{}", self.theme.format_warning(msg)).ok();
        }
    }

    fn error(&mut self, msg: &str) {
        writeln!(self.err, "{}", self.theme.format_error(msg)).ok();
    }

    fn skipped(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "{}", self.theme.format_skipped(msg)).ok();
        }
    }

    fn show_header(&mut self, title: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "\n{}\n", self.theme.format_header(title)).ok();
        }
    }

    fn show_error_block(&mut self, command: &str, stderr_tail: &[String]) {
        let b = &self.theme.border;
        writeln!(
            self.err,
            "    {} {}",
            b.apply_to("┌─"),
            b.apply_to("Command ──────────────────────────")
        )
        .ok();
        writeln!(
            self.err,
            "    {} {}",
            b.apply_to("│"),
            self.theme.command.apply_to(command)
        )
        .ok();

        if !stderr_tail.is_empty() {
            writeln!(
                self.err,
                "    {} {}",
                b.apply_to("├─"),
                b.apply_to("Stderr (last lines) ──────────────")
            )
            .ok();
            for line in stderr_tail {
                writeln!(self.err, "    {} {}", b.apply_to("│"), line).ok();
            }
        }

        writeln!(
            self.err,
            "    {}",
            b.apply_to("└────────────────────────────────────")
        )
        .ok();
    }

    fn show_run_summary(&mut self, summary: &RunSummary) {
        if !self.mode.shows_status() {
            return;
        }

        let b = &self.theme.border;
        writeln!(self.out).ok();
        writeln!(
            self.out,
            "  {} {}",
            b.apply_to("┌─"),
            b.apply_to("Summary ──────────────────────────")
        )
        .ok();

        for stage in &summary.stages {
            let right_side = match (stage.duration, stage.detail.as_deref()) {
                (_, Some(detail)) => self.theme.dim.apply_to(detail).to_string(),
                (Some(d), None) => self.theme.duration.apply_to(format_duration(d)).to_string(),
                (None, None) => String::new(),
            };
            writeln!(
                self.out,
                "  {} {} {:<20} {}",
                b.apply_to("│"),
                self.theme.status_icon(stage.status),
                stage.name,
                right_side,
            )
            .ok();
        }

        writeln!(
            self.out,
            "  {}",
            b.apply_to("├────────────────────────────────────")
        )
        .ok();
        writeln!(
            self.out,
            "  {} Total: {} {} {} run {} {} skipped",
            b.apply_to("│"),
            self.theme
                .duration
                .apply_to(format_duration(summary.total_duration)),
            self.theme.dim.apply_to("·"),
            summary.stages_run,
            self.theme.dim.apply_to("·"),
            summary.stages_skipped,
        )
        .ok();
        writeln!(
            self.out,
            "  {}",
            b.apply_to("└────────────────────────────────────")
        )
        .ok();
    }
}

/// Create the terminal UI for a given output mode.
pub fn create_ui(mode: OutputMode) -> Box<dyn UserInterface> {
    Box::new(TerminalUI::new(mode))
}
