//! Pipeline file schema definitions.
//!
//! These structs map one-to-one onto the YAML pipeline file. They carry
//! no validation of their own; see [`super::validator`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root of a pipeline file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name (for display and the ledger)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Directory stages run in, relative to the pipeline file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    /// Where the ledger and run log live, relative to the workdir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Number of runs kept in the ledger history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_retention: Option<usize>,

    /// External executables that must be on PATH
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Environment applied to every stage
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Stage declarations, in file order
    pub stages: Vec<StageConfig>,
}

/// A single stage declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Unique stage name
    pub name: String,

    /// Optional human description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Command to execute
    #[serde(default)]
    pub command: CommandConfig,

    /// Files the stage reads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PathBuf>,

    /// Files the stage must produce
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PathBuf>,

    /// Stages that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Attempts before the stage is declared failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Wall-clock limit per attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Stage-specific environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// How a stage command is written in the file.
///
/// A list is an argument vector run directly; a string is handed to the
/// platform shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    Argv(Vec<String>),
    Shell(String),
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self::Argv(Vec::new())
    }
}

impl CommandConfig {
    /// Whether the command has nothing to run.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Argv(argv) => argv.first().map_or(true, |program| program.trim().is_empty()),
            Self::Shell(line) => line.trim().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_pipeline() {
        let yaml = r#"
stages:
  - name: setup
    command: ["mkdir", "-p", "build"]
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.stages.len(), 1);
        assert_eq!(
            config.stages[0].command,
            CommandConfig::Argv(vec!["mkdir".into(), "-p".into(), "build".into()])
        );
        assert!(config.stages[0].max_attempts.is_none());
    }

    #[test]
    fn parses_shell_command_string() {
        let yaml = r#"
stages:
  - name: clean
    command: "Rscript clean.R"
    inputs: [raw/survey.csv]
    outputs: [build/clean.csv]
    depends_on: [setup]
    max_attempts: 3
    timeout_seconds: 600
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        let stage = &config.stages[0];
        assert_eq!(stage.command, CommandConfig::Shell("Rscript clean.R".into()));
        assert_eq!(stage.inputs, vec![PathBuf::from("raw/survey.csv")]);
        assert_eq!(stage.max_attempts, Some(3));
        assert_eq!(stage.timeout_seconds, Some(600));
    }

    #[test]
    fn parses_pipeline_settings() {
        let yaml = r#"
name: wage-study
workdir: analysis
requires: [Rscript, stata]
env:
  LANG: C
stages: []
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("wage-study"));
        assert_eq!(config.workdir, Some(PathBuf::from("analysis")));
        assert_eq!(config.requires, vec!["Rscript", "stata"]);
        assert_eq!(config.env.get("LANG").map(String::as_str), Some("C"));
    }

    #[test]
    fn rejects_unknown_stage_field() {
        let yaml = r#"
stages:
  - name: setup
    command: ["true"]
    dependson: [x]
"#;
        assert!(serde_yaml::from_str::<PipelineConfig>(yaml).is_err());
    }

    #[test]
    fn missing_command_defaults_to_empty() {
        let yaml = "stages:\n  - name: setup\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.stages[0].command.is_empty());
    }

    #[test]
    fn blank_commands_are_empty() {
        assert!(CommandConfig::Shell("   ".into()).is_empty());
        assert!(CommandConfig::Argv(vec![]).is_empty());
        assert!(CommandConfig::Argv(vec!["".into(), "x".into()]).is_empty());
        assert!(!CommandConfig::Argv(vec!["true".into()]).is_empty());
    }
}
