//! Playground path resolution

use std::path::{Path, PathBuf};
use tracing::debug;
use workstore::ProjectRef;

/// Expand a leading `~/` against the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Root directory holding local working copies as `<org>/<project>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playground {
    root: PathBuf,
}

impl Playground {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "Playground::new: called");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working copy of `project`
    pub fn project_path(&self, project: &ProjectRef) -> PathBuf {
        self.root.join(&project.org).join(&project.project)
    }
}
