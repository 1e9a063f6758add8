//! External tool checks.
//!
//! A pipeline may list executables it needs (`Rscript`, `stata-mp`, ...).
//! They are resolved against `PATH` once, before anything runs. Nothing is
//! installed: a missing tool is a definition error.

use std::path::{Path, PathBuf};

use crate::error::{DefinitionError, Result};

/// Check whether a file has executable permission bits set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// On Windows, executability is determined by file extension, not permission bits.
#[cfg(not(unix))]
pub fn is_executable(_path: &Path) -> bool {
    true
}

/// Parse the system PATH environment variable into a list of directories.
pub fn parse_system_path() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default()
}

/// Resolve a tool's binary path by iterating over PATH entries.
///
/// A tool given as a path (`./bin/tool`, `/opt/stata/stata-mp`) is checked
/// directly instead.
pub fn resolve_tool_path(tool: &str, path_entries: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(tool);
    if direct.components().count() > 1 {
        return (direct.is_file() && is_executable(direct)).then(|| direct.to_path_buf());
    }

    for dir in path_entries {
        for candidate in candidates(dir, tool) {
            if candidate.is_file() && is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(windows)]
fn candidates(dir: &Path, tool: &str) -> Vec<PathBuf> {
    ["", ".exe", ".cmd", ".bat"]
        .iter()
        .map(|ext| dir.join(format!("{}{}", tool, ext)))
        .collect()
}

#[cfg(not(windows))]
fn candidates(dir: &Path, tool: &str) -> Vec<PathBuf> {
    vec![dir.join(tool)]
}

/// Verify every required tool resolves, failing on the first one missing.
pub fn check_requirements(requires: &[String], path_entries: &[PathBuf]) -> Result<()> {
    for tool in requires {
        match resolve_tool_path(tool, path_entries) {
            Some(found) => tracing::debug!("requirement '{}' found at {}", tool, found.display()),
            None => {
                return Err(DefinitionError::MissingRequirement { tool: tool.clone() }.into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReprunError;
    use std::fs;
    use tempfile::TempDir;

    fn make_tool(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn resolves_tool_on_path() {
        let temp = TempDir::new().unwrap();
        let tool = make_tool(temp.path(), "Rscript");

        let found = resolve_tool_path("Rscript", &[temp.path().to_path_buf()]);
        assert_eq!(found, Some(tool));
    }

    #[test]
    fn missing_tool_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(resolve_tool_path("stata-mp", &[temp.path().to_path_buf()]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes"), "plain text").unwrap();
        assert!(resolve_tool_path("notes", &[temp.path().to_path_buf()]).is_none());
    }

    #[test]
    fn explicit_path_is_checked_directly() {
        let temp = TempDir::new().unwrap();
        let tool = make_tool(temp.path(), "runner");
        let found = resolve_tool_path(tool.to_str().unwrap(), &[]);
        assert_eq!(found, Some(tool));
    }

    #[test]
    fn check_requirements_names_missing_tool() {
        let temp = TempDir::new().unwrap();
        make_tool(temp.path(), "python3");
        let entries = vec![temp.path().to_path_buf()];

        assert!(check_requirements(&["python3".to_string()], &entries).is_ok());

        let err = check_requirements(&["python3".to_string(), "stata".to_string()], &entries)
            .unwrap_err();
        match err {
            ReprunError::Definition(DefinitionError::MissingRequirement { tool }) => {
                assert_eq!(tool, "stata");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_system_path_returns_entries() {
        let entries = parse_system_path();
        assert!(!entries.is_empty() || std::env::var_os("PATH").is_none());
    }
}
