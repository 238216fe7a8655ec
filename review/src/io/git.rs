//! Git adapter for the review pipeline.
//!
//! Bundling asks git which paths count (tracked plus untracked-but-not-ignored)
//! and patch application goes through `git apply`, so we keep a small, explicit
//! wrapper around `git` subprocess calls.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, instrument};

use crate::error::{Result, ReviewError};

/// Outcome of a single `git apply` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyAttempt {
    pub success: bool,
    pub stderr: String,
}

/// Wrapper for executing git commands at a repository root.
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    /// Resolve the repository root containing `path`.
    ///
    /// Fails with [`ReviewError::NotAGitRepository`] when `path` is not inside
    /// a work tree or git cannot be spawned.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn discover(path: &Path) -> Result<Self> {
        let not_a_repo = || ReviewError::NotAGitRepository {
            path: path.to_path_buf(),
        };
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(path)
            .output()
            .map_err(|_| not_a_repo())?;
        if !output.status.success() {
            return Err(not_a_repo());
        }
        let top = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if top.is_empty() {
            return Err(not_a_repo());
        }
        debug!(root = %top, "resolved repository root");
        Ok(Self {
            root: PathBuf::from(top),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths git considers part of the tree, tracked first.
    ///
    /// This is the union of `git ls-files` and
    /// `git ls-files --others --exclude-standard`, de-duplicated with the
    /// first occurrence winning. Output order is stable for a fixed index and
    /// ignore configuration.
    #[instrument(skip_all)]
    pub fn list_bundle_files(&self) -> Result<Vec<String>> {
        let tracked = self.ls_files(&[])?;
        let untracked = self.ls_files(&["--others", "--exclude-standard"])?;
        let files = dedup_preserving_order(tracked.into_iter().chain(untracked));
        debug!(count = files.len(), "enumerated bundle files");
        Ok(files)
    }

    /// Run `git apply --whitespace=fix`, optionally with `--3way`.
    ///
    /// A failed apply is reported through [`ApplyAttempt`], not as an error;
    /// only a failure to spawn git is an error.
    #[instrument(skip_all, fields(three_way = three_way))]
    pub fn apply(&self, patch_path: &Path, three_way: bool) -> Result<ApplyAttempt> {
        let patch = patch_path.to_string_lossy();
        let mut args = vec!["apply"];
        if three_way {
            args.push("--3way");
        }
        args.push("--whitespace=fix");
        args.push(&patch);
        let output = self.run(&args)?;
        Ok(ApplyAttempt {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn ls_files(&self, extra_args: &[&str]) -> Result<Vec<String>> {
        let mut args = vec!["ls-files", "-z"];
        args.extend_from_slice(extra_args);
        let output = self.run_checked(&args)?;
        Ok(split_nul_paths(&output.stdout))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReviewError::Git {
                args: args.join(" "),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|err| ReviewError::io(format!("spawn git {}", args.join(" ")), err))
    }
}

fn split_nul_paths(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|p| !p.is_empty())
        .map(|p| String::from_utf8_lossy(p).to_string())
        .collect()
}

fn dedup_preserving_order(paths: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nul_separated_output() {
        let raw = b"a.txt\0dir/b.txt\0\0with space.md\0";
        assert_eq!(
            split_nul_paths(raw),
            vec!["a.txt", "dir/b.txt", "with space.md"]
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let paths = ["b", "a", "b", "", "c", "a"].map(String::from);
        assert_eq!(dedup_preserving_order(paths), vec!["b", "a", "c"]);
    }

    #[test]
    fn discover_rejects_plain_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Git::discover(temp.path()).expect_err("not a repo");
        assert!(matches!(err, ReviewError::NotAGitRepository { .. }));
    }
}
