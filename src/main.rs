//! Reprun CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use reprun::cli::{Cli, CommandDispatcher};
use reprun::ui::{create_ui, OutputMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. `--verbose` sets INFO, which includes live stage output
/// 4. Default is WARN
fn init_tracing(debug: bool, verbose: bool) {
    let filter = if debug {
        EnvFilter::new("reprun=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if verbose { "reprun=info" } else { "reprun=warn" })
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.verbose);

    tracing::debug!("reprun starting with args: {:?}", cli);

    // Handle --no-color
    if cli.no_color {
        std::env::set_var("NO_COLOR", "1");
    }

    let mut ui = create_ui(OutputMode::from_flags(cli.verbose, cli.quiet));
    let dispatcher = CommandDispatcher::new();

    let code = match dispatcher.dispatch(&cli, ui.as_mut()) {
        Ok(result) => result.exit_code,
        Err(e) => {
            ui.error(&format!("Error: {}", e));
            e.exit_code()
        }
    };

    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
