//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Reprun - dependency-aware, resumable stage pipelines.
#[derive(Debug, Parser)]
#[command(name = "reprun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show verbose output, including live stage output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the stages of a pipeline
    Run(RunArgs),

    /// Validate a pipeline and print its execution order
    Check(CheckArgs),

    /// Show whether each stage is current or stale
    Status(StatusArgs),

    /// Show recorded runs
    History(HistoryArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Pipeline definition file
    #[arg(value_name = "PIPELINE")]
    pub pipeline: PathBuf,

    /// Run only these stages (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "STAGE")]
    pub only: Vec<String>,

    /// Run this stage and everything that depends on it
    #[arg(long, value_name = "STAGE")]
    pub from: Option<String>,

    /// Show what would run without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum number of stages running at once
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    /// Run stages even if their last success is current
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `check` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CheckArgs {
    /// Pipeline definition file
    #[arg(value_name = "PIPELINE")]
    pub pipeline: PathBuf,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, clap::Args)]
pub struct StatusArgs {
    /// Pipeline definition file
    #[arg(value_name = "PIPELINE")]
    pub pipeline: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `history` command.
#[derive(Debug, Clone, clap::Args)]
pub struct HistoryArgs {
    /// Pipeline definition file
    #[arg(value_name = "PIPELINE")]
    pub pipeline: PathBuf,

    /// Number of runs to show
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_selection() {
        let cli = Cli::parse_from([
            "reprun",
            "run",
            "pipeline.yml",
            "--only",
            "setup,clean",
            "--workers",
            "4",
            "--dry-run",
        ]);

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.pipeline, PathBuf::from("pipeline.yml"));
                assert_eq!(args.only, vec!["setup", "clean"]);
                assert_eq!(args.workers, 4);
                assert!(args.dry_run);
                assert!(!args.force);
                assert!(args.from.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn run_defaults_to_one_worker() {
        let cli = Cli::parse_from(["reprun", "run", "p.yml"]);
        match cli.command {
            Commands::Run(args) => assert_eq!(args.workers, 1),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = Cli::try_parse_from(["reprun", "run", "p.yml", "--workers", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["reprun", "status", "p.yml", "--json", "--no-color", "-v"]);
        assert!(cli.no_color);
        assert!(cli.verbose);
        match cli.command {
            Commands::Status(args) => assert!(args.json),
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn pipeline_file_is_required() {
        assert!(Cli::try_parse_from(["reprun", "run"]).is_err());
        assert!(Cli::try_parse_from(["reprun", "check"]).is_err());
    }
}
