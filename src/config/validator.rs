//! Pipeline definition validation rules.
//!
//! This module validates a parsed pipeline for correctness:
//! - Stage names must be non-empty and unique
//! - Every stage must have a command
//! - depends_on must reference existing stages
//! - max_attempts and timeout_seconds must be positive
//!
//! Cycles are left to the dependency graph, which reports them with
//! their own error and exit code.

use crate::config::schema::PipelineConfig;
use crate::error::{DefinitionError, Result};
use std::collections::HashSet;

/// Validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Stage name if error is stage-specific
    pub stage: Option<String>,
}

/// Validate a pipeline and return all errors.
///
/// Every rule runs, so one pass reports every problem in the file.
pub fn validate_config(config: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_names(config));
    errors.extend(validate_stages(config));
    errors.extend(validate_dependencies(config));

    errors
}

/// Validate and return a single error summarizing every problem.
pub fn validate(config: &PipelineConfig) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        return Ok(());
    }

    Err(DefinitionError::Invalid {
        problems: errors.into_iter().map(|e| e.message).collect(),
    }
    .into())
}

fn validate_names(config: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, stage) in config.stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            errors.push(ValidationError {
                rule: "empty-name",
                message: format!("stage #{} has an empty name", index + 1),
                stage: None,
            });
            continue;
        }

        if !seen.insert(stage.name.as_str()) {
            errors.push(ValidationError {
                rule: "duplicate-name",
                message: format!("stage '{}' is declared more than once", stage.name),
                stage: Some(stage.name.clone()),
            });
        }
    }

    errors
}

fn validate_stages(config: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for stage in &config.stages {
        if stage.command.is_empty() {
            errors.push(ValidationError {
                rule: "empty-command",
                message: format!("stage '{}' has an empty command", stage.name),
                stage: Some(stage.name.clone()),
            });
        }

        if stage.max_attempts == Some(0) {
            errors.push(ValidationError {
                rule: "zero-attempts",
                message: format!("stage '{}' sets max_attempts to 0", stage.name),
                stage: Some(stage.name.clone()),
            });
        }

        if stage.timeout_seconds == Some(0) {
            errors.push(ValidationError {
                rule: "zero-timeout",
                message: format!("stage '{}' sets timeout_seconds to 0", stage.name),
                stage: Some(stage.name.clone()),
            });
        }
    }

    errors
}

fn validate_dependencies(config: &PipelineConfig) -> Vec<ValidationError> {
    let names: HashSet<&str> = config.stages.iter().map(|s| s.name.as_str()).collect();
    let mut errors = Vec::new();

    for stage in &config.stages {
        for dep in &stage.depends_on {
            if !names.contains(dep.as_str()) {
                errors.push(ValidationError {
                    rule: "unknown-dependency",
                    message: format!(
                        "stage '{}' depends on unknown stage '{}'",
                        stage.name, dep
                    ),
                    stage: Some(stage.name.clone()),
                });
            }
        }
    }

    errors
}
