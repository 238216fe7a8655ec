//! Canonical artifact paths for a review run.
//!
//! Every run overwrites the same set of files so the latest bundle, prompt,
//! response, and patch are always in one place for inspection.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ReviewError};

/// Default artifact directory name under the repository root.
pub const DEFAULT_ARTIFACT_DIRNAME: &str = ".codex-review";

/// All artifact paths for a run.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub bundle_path: PathBuf,
    pub prompt_path: PathBuf,
    pub response_md_path: PathBuf,
    pub response_json_path: PathBuf,
    pub patch_path: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            bundle_path: dir.join("bundle.zip"),
            prompt_path: dir.join("prompt.md"),
            response_md_path: dir.join("response.md"),
            response_json_path: dir.join("response.json"),
            patch_path: dir.join("patch.diff"),
            dir,
        }
    }

    /// Resolve the artifact directory for `repo_root`.
    ///
    /// `None` selects `<repo_root>/.codex-review`; relative paths resolve
    /// against `repo_root`. The directory is created and canonicalized so
    /// later containment checks compare like with like.
    pub fn resolve(repo_root: &Path, configured: Option<&Path>) -> Result<Self> {
        let dir = match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => repo_root.join(path),
            None => repo_root.join(DEFAULT_ARTIFACT_DIRNAME),
        };
        fs::create_dir_all(&dir)
            .map_err(|err| ReviewError::io(format!("create {}", dir.display()), err))?;
        let dir = fs::canonicalize(&dir)
            .map_err(|err| ReviewError::io(format!("resolve {}", dir.display()), err))?;
        Ok(Self::new(dir))
    }
}

/// Write `contents` to `path`, creating parent directories as needed.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| ReviewError::io(format!("create {}", parent.display()), err))?;
    }
    fs::write(path, contents)
        .map_err(|err| ReviewError::io(format!("write {}", path.display()), err))
}

/// Resolve a user-supplied path against the repository root.
pub fn resolve_against(repo_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
    }
}
