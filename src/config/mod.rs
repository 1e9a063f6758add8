//! Pipeline file loading, parsing, and validation.
//!
//! - Schema definitions in [`schema`]
//! - File loading in [`loader`]
//! - Validation in [`validator`]
//!
//! # Example
//!
//! ```
//! use reprun::config::{parse_pipeline, validate};
//! use std::path::Path;
//!
//! let yaml = r#"
//! stages:
//!   - name: setup
//!     command: ["mkdir", "-p", "build"]
//!   - name: clean
//!     command: "Rscript clean.R"
//!     depends_on: [setup]
//! "#;
//!
//! let config = parse_pipeline(yaml, Path::new("pipeline.yml")).unwrap();
//! validate(&config).unwrap();
//! assert_eq!(config.stages.len(), 2);
//! ```

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::{load_pipeline_file, parse_pipeline};
pub use schema::{CommandConfig, PipelineConfig, StageConfig};
pub use validator::{validate, validate_config, ValidationError};
