//! Validated stage and pipeline definitions.
//!
//! A [`Pipeline`] is built once from a [`PipelineConfig`]: names are
//! checked, paths are anchored to the working directory, and the
//! dependency graph and its execution order are computed. Nothing here
//! changes after construction.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{load_pipeline_file, validate, CommandConfig, PipelineConfig, StageConfig};
use crate::error::{DefinitionError, Result};
use crate::runner::DependencyGraph;

/// Default directory (under the workdir) for the ledger and run log.
pub const DEFAULT_STATE_DIR: &str = ".reprun";

/// Default number of runs kept in the ledger history.
pub const DEFAULT_HISTORY_RETENTION: usize = 20;

/// The invocation a stage runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCommand {
    /// Program and arguments, executed directly.
    Argv(Vec<String>),
    /// A command line handed to the platform shell.
    Shell(String),
}

impl From<&CommandConfig> for StageCommand {
    fn from(config: &CommandConfig) -> Self {
        match config {
            CommandConfig::Argv(argv) => Self::Argv(argv.clone()),
            CommandConfig::Shell(line) => Self::Shell(line.clone()),
        }
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argv(argv) => {
                let quoted: Vec<String> = argv
                    .iter()
                    .map(|arg| {
                        if arg.is_empty() || arg.contains(char::is_whitespace) {
                            format!("'{}'", arg)
                        } else {
                            arg.clone()
                        }
                    })
                    .collect();
                write!(f, "{}", quoted.join(" "))
            }
            Self::Shell(line) => write!(f, "{}", line),
        }
    }
}

/// Static declaration of one pipeline stage.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Unique stage name.
    pub name: String,
    /// Optional human description.
    pub description: Option<String>,
    /// What to execute.
    pub command: StageCommand,
    /// Files read by the stage, as declared.
    pub inputs: Vec<PathBuf>,
    /// Files the stage must produce, as declared.
    pub outputs: Vec<PathBuf>,
    /// Stages that must complete first.
    pub depends_on: Vec<String>,
    /// Attempts before the stage is declared failed (at least 1).
    pub max_attempts: u32,
    /// Wall-clock limit per attempt.
    pub timeout: Option<Duration>,
    /// Environment for this stage, pipeline env already merged in.
    pub env: BTreeMap<String, String>,
}

impl StageDescriptor {
    fn from_config(config: &StageConfig, pipeline_env: &BTreeMap<String, String>) -> Self {
        let mut env = pipeline_env.clone();
        env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            command: StageCommand::from(&config.command),
            inputs: config.inputs.clone(),
            outputs: config.outputs.clone(),
            depends_on: config.depends_on.clone(),
            max_attempts: config.max_attempts.unwrap_or(1),
            timeout: config.timeout_seconds.map(Duration::from_secs),
            env,
        }
    }
}

/// A validated, ordered pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    workdir: PathBuf,
    state_dir: PathBuf,
    history_retention: usize,
    requires: Vec<String>,
    stages: BTreeMap<String, StageDescriptor>,
    graph: DependencyGraph,
    order: Vec<String>,
}

impl Pipeline {
    /// Load, validate and order the pipeline at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let config = load_pipeline_file(path)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let default_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "pipeline".to_string());

        Self::from_config(&config, &base, &default_name)
    }

    /// Build a pipeline from parsed config.
    ///
    /// `base` anchors a relative `workdir`; stages run in `base` when no
    /// workdir is declared.
    pub fn from_config(config: &PipelineConfig, base: &Path, default_name: &str) -> Result<Self> {
        validate(config)?;

        let workdir = match &config.workdir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        };
        let state_dir = match &config.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => workdir.join(dir),
            None => workdir.join(DEFAULT_STATE_DIR),
        };

        let stages: BTreeMap<String, StageDescriptor> = config
            .stages
            .iter()
            .map(|s| (s.name.clone(), StageDescriptor::from_config(s, &config.env)))
            .collect();

        let graph = stages
            .values()
            .fold(DependencyGraph::builder(), |builder, stage| {
                builder.add_stage(stage.name.clone(), stage.depends_on.iter().cloned())
            })
            .build()?;
        let order = graph.order()?;

        Ok(Self {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| default_name.to_string()),
            workdir,
            state_dir,
            history_retention: config
                .history_retention
                .unwrap_or(DEFAULT_HISTORY_RETENTION),
            requires: config.requires.clone(),
            stages,
            graph,
            order,
        })
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory stages run in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Directory holding the ledger and run log.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Number of runs kept in the ledger history.
    pub fn history_retention(&self) -> usize {
        self.history_retention
    }

    /// External tools that must be on PATH.
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// Look up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.get(name)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline declares no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The dependency graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Stage names in execution order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Stages in execution order.
    pub fn ordered_stages(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.order.iter().filter_map(|name| self.stages.get(name))
    }

    /// Resolve a declared path against the workdir.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    /// Ensure `name` is a declared stage.
    pub fn require_stage(&self, name: &str) -> Result<&StageDescriptor> {
        self.stages.get(name).ok_or_else(|| {
            DefinitionError::UnknownSelection {
                name: name.to_string(),
            }
            .into()
        })
    }
}
