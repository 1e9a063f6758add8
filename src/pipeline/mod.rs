//! Validated pipeline definitions.
//!
//! - [`stage`] - [`StageDescriptor`] and the immutable [`Pipeline`]
//! - [`requirements`] - external tool checks performed before a run

pub mod requirements;
pub mod stage;

pub use requirements::{check_requirements, parse_system_path, resolve_tool_path};
pub use stage::{
    Pipeline, StageCommand, StageDescriptor, DEFAULT_HISTORY_RETENTION, DEFAULT_STATE_DIR,
};
