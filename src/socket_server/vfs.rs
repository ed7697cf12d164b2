//! Resource overlay for `get` requests
//!
//! Anything under `Resources/android` shadows the file of the same relative
//! path under `Resources`.

use std::path::{Component, Path, PathBuf};

/// Platform directory whose files take precedence over generic resources
pub const PLATFORM_DIR: &str = "android";

/// Two-tier view over a project's resources directory
#[derive(Debug, Clone)]
pub struct ResourceOverlay {
    resources_dir: PathBuf,
}

impl ResourceOverlay {
    pub fn new(resources_dir: impl Into<PathBuf>) -> Self {
        Self {
            resources_dir: resources_dir.into(),
        }
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }

    /// Resolve a request path to the file that should be served.
    ///
    /// Returns `None` when neither tier holds a regular file, or when the
    /// request tries to leave the resources directory.
    pub async fn resolve(&self, relative_path: &str) -> Option<PathBuf> {
        let relative = sanitize(relative_path)?;

        let platform = self.resources_dir.join(PLATFORM_DIR).join(&relative);
        if is_file(&platform).await {
            return Some(platform);
        }

        let generic = self.resources_dir.join(&relative);
        if is_file(&generic).await {
            return Some(generic);
        }

        None
    }

    /// Resolve and read a resource
    pub async fn read(&self, relative_path: &str) -> std::io::Result<Option<(PathBuf, Vec<u8>)>> {
        let Some(path) = self.resolve(relative_path).await else {
            return Ok(None);
        };
        let contents = tokio::fs::read(&path).await?;
        Ok(Some((path, contents)))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Keep only normal components; reject absolute and parent-relative paths.
fn sanitize(relative_path: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(relative_path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
