//! Pipeline file loading.
//!
//! Reads a YAML pipeline file and parses it into [`PipelineConfig`]. Path
//! resolution and validation happen when the config is turned into a
//! [`Pipeline`](crate::pipeline::Pipeline).

use crate::config::schema::PipelineConfig;
use crate::error::{DefinitionError, ReprunError, Result};
use std::fs;
use std::path::Path;

/// Load a single pipeline file.
///
/// # Errors
///
/// Returns `DefinitionError::NotFound` if the file doesn't exist.
/// Returns `DefinitionError::Parse` if the YAML is invalid.
pub fn load_pipeline_file(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReprunError::from(DefinitionError::NotFound {
                path: path.to_path_buf(),
            })
        } else {
            ReprunError::Io(e)
        }
    })?;

    parse_pipeline(&content, path)
}

/// Parse YAML content into a PipelineConfig.
///
/// # Arguments
///
/// * `content` - The YAML content to parse
/// * `source_path` - Path for error reporting
pub fn parse_pipeline(content: &str, source_path: &Path) -> Result<PipelineConfig> {
    serde_yaml::from_str(content).map_err(|e| {
        DefinitionError::Parse {
            path: source_path.to_path_buf(),
            message: e.to_string(),
        }
        .into()
    })
}
