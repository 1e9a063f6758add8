//! Process execution and platform integration.

pub mod command;
pub mod platform;

pub use command::{
    execute, execute_streaming, CommandOptions, CommandResult, OutputLine, Termination,
};
pub use platform::{detect_shell, install_interrupt_handler, interrupted, shell_flag};
