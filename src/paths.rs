//! Path resolution for project directories and their fastdev files
//!
//! All CLI commands resolve the project directory and the lock file through
//! these helpers so `start`, `stop` and `status` agree on locations.

use std::path::{Path, PathBuf};

use crate::{FastdevError, Result};

/// Default lock file name inside the project directory
pub const LOCK_FILE_NAME: &str = ".fastdev.lock";

/// Directory (inside the project) served by `get`
pub const RESOURCES_DIR_NAME: &str = "Resources";

/// Resolve the project directory, defaulting to the current directory.
///
/// A leading `~` is expanded to the home directory and relative paths are
/// made absolute against the current directory.
///
/// # Examples
///
/// ```ignore
/// use fastdev::paths::resolve_project_dir;
///
/// let cwd = resolve_project_dir(None)?;
/// let project = resolve_project_dir(Some(Path::new("~/apps/kitchen-sink")))?;
/// ```
pub fn resolve_project_dir(path: Option<&Path>) -> Result<PathBuf> {
    let Some(path) = path else {
        return current_dir();
    };

    let expanded = expand_home(path);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(current_dir()?.join(expanded))
    }
}

/// Lock file for a project: the explicit override, or `<dir>/.fastdev.lock`.
pub fn lock_file_path(project_dir: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) => p.to_path_buf(),
        None => project_dir.join(LOCK_FILE_NAME),
    }
}

/// `<dir>/Resources`
pub fn resources_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(RESOURCES_DIR_NAME)
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| FastdevError::Config {
        message: format!("cannot determine current directory: {}", e),
    })
}
