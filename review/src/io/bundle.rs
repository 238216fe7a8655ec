//! Repository bundling into `bundle.zip`.
//!
//! The bundle holds every file git would keep (tracked plus untracked but not
//! ignored), never the artifact directory itself, and a configurable slice of
//! `.git`. Symlinks are stored as links, not followed. Entry order follows
//! git's listing, and `.git` walks are sorted, so an unchanged tree yields
//! the same entry order on every run.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::core::sanitize::sanitize_git_config;
use crate::core::types::GitInclusion;
use crate::error::{Result, ReviewError};
use crate::io::git::Git;

const GIT_DIR: &str = ".git";
const SYMLINK_MODE: u32 = 0o777;

/// Paths under `.git` included in `metadata` mode.
const METADATA_ALLOW_LIST: &[&str] = &[
    "HEAD",
    "packed-refs",
    "refs",
    "info/exclude",
    "description",
    "config",
];

/// Options controlling bundle contents and size.
#[derive(Debug, Clone, Copy)]
pub struct BundleOptions {
    pub include_git: GitInclusion,
    /// Abort if the finished zip is larger than this many bytes.
    pub max_zip_bytes: u64,
}

/// What ended up in the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReport {
    pub path: PathBuf,
    pub size: u64,
    /// Entry names in write order.
    pub entries: Vec<String>,
    /// Paths that vanished between listing and packing.
    pub skipped: Vec<PathBuf>,
}

/// Build `output_path` from the repository at `git.root()`.
///
/// Anything inside `artifact_dir` is excluded so a run never bundles its own
/// output. The size ceiling is checked after the zip is complete; an
/// oversized zip is left on disk and [`ReviewError::ArchiveTooLarge`] is
/// returned.
#[instrument(
    skip_all,
    fields(include_git = %options.include_git, max_zip_bytes = options.max_zip_bytes)
)]
pub fn create_bundle(
    git: &Git,
    artifact_dir: &Path,
    output_path: &Path,
    options: BundleOptions,
) -> Result<BundleReport> {
    let repo_root = git.root();
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| ReviewError::io(format!("create {}", parent.display()), err))?;
    }

    let files = git.list_bundle_files()?;
    let file = File::create(output_path)
        .map_err(|err| ReviewError::io(format!("create {}", output_path.display()), err))?;
    let mut writer = BundleWriter::new(file);

    for rel in &files {
        let file_path = repo_root.join(rel);
        if file_path.starts_with(artifact_dir) {
            continue;
        }
        if is_git_dir_rel(rel) {
            continue;
        }
        if fs::symlink_metadata(&file_path).is_ok_and(|meta| meta.is_dir()) {
            // Submodule gitlinks show up in ls-files as directories.
            continue;
        }
        writer.add_path(&file_path, &arcname_for(repo_root, &file_path))?;
    }

    add_git_dir(&mut writer, repo_root, options.include_git)?;

    let (entries, skipped) = writer.finish()?;
    let size = fs::metadata(output_path)
        .map_err(|err| ReviewError::io(format!("stat {}", output_path.display()), err))?
        .len();
    debug!(entries = entries.len(), skipped = skipped.len(), size, "bundle written");

    if size > options.max_zip_bytes {
        return Err(ReviewError::ArchiveTooLarge {
            size,
            limit: options.max_zip_bytes,
        });
    }

    info!(path = %output_path.display(), size, "created bundle");
    Ok(BundleReport {
        path: output_path.to_path_buf(),
        size,
        entries,
        skipped,
    })
}

fn add_git_dir(
    writer: &mut BundleWriter,
    repo_root: &Path,
    include_git: GitInclusion,
) -> Result<()> {
    if include_git == GitInclusion::None {
        return Ok(());
    }

    let git_path = repo_root.join(GIT_DIR);
    if git_path.is_file() {
        warn!(
            "{GIT_DIR} is a file (worktree/submodule); including only the pointer file, not the referenced gitdir"
        );
        return writer.add_path(&git_path, GIT_DIR);
    }
    if !git_path.is_dir() {
        warn!("no {GIT_DIR} directory found; skipping");
        return Ok(());
    }

    match include_git {
        GitInclusion::None => Ok(()),
        GitInclusion::Metadata => add_git_metadata(writer, repo_root, &git_path),
        GitInclusion::Full => {
            for child in sorted_files(&git_path) {
                let is_lock = child
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().ends_with(".lock"));
                if is_lock {
                    continue;
                }
                writer.add_path(&child, &arcname_for(repo_root, &child))?;
            }
            Ok(())
        }
    }
}

fn add_git_metadata(writer: &mut BundleWriter, repo_root: &Path, git_path: &Path) -> Result<()> {
    let config_path = git_path.join("config");
    for allowed in METADATA_ALLOW_LIST {
        let root = git_path.join(allowed);
        if !root.exists() {
            continue;
        }
        if root.is_dir() {
            for child in sorted_files(&root) {
                writer.add_path(&child, &arcname_for(repo_root, &child))?;
            }
            continue;
        }

        let arcname = arcname_for(repo_root, &root);
        if root == config_path {
            match fs::read(&root) {
                Ok(raw) => {
                    let sanitized = sanitize_git_config(&String::from_utf8_lossy(&raw));
                    writer.add_bytes(&arcname, sanitized.as_bytes())?;
                }
                Err(err) => warn!(err = %err, "failed to read {GIT_DIR}/config; skipping"),
            }
        } else {
            writer.add_path(&root, &arcname)?;
        }
    }
    Ok(())
}

/// Non-directory entries under `dir`, depth-first in file-name order.
fn sorted_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(err = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect()
}

fn is_git_dir_rel(rel: &str) -> bool {
    rel == GIT_DIR || rel.starts_with(".git/")
}

/// Forward-slash archive name for `path` relative to `repo_root`.
fn arcname_for(repo_root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(repo_root).unwrap_or(path);
    rel.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// Zip writer that records entry names and tolerates vanished files.
struct BundleWriter {
    zip: ZipWriter<File>,
    entries: Vec<String>,
    skipped: Vec<PathBuf>,
}

impl BundleWriter {
    fn new(file: File) -> Self {
        Self {
            zip: ZipWriter::new(file),
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Add the file at `path`, storing symlinks as links.
    fn add_path(&mut self, path: &Path, arcname: &str) -> Result<()> {
        if arcname.is_empty() {
            return Ok(());
        }
        match self.try_add_path(path, arcname) {
            Err(ReviewError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "skipping missing file");
                self.skipped.push(path.to_path_buf());
                Ok(())
            }
            other => other,
        }
    }

    fn try_add_path(&mut self, path: &Path, arcname: &str) -> Result<()> {
        let meta = fs::symlink_metadata(path)
            .map_err(|err| ReviewError::io(format!("stat {}", path.display()), err))?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(path)
                .map_err(|err| ReviewError::io(format!("read link {}", path.display()), err))?;
            let target = target.to_string_lossy().into_owned();
            self.zip.add_symlink(
                arcname,
                target.as_str(),
                entry_options().unix_permissions(SYMLINK_MODE),
            )?;
            self.entries.push(arcname.to_string());
            return Ok(());
        }

        let mut source = File::open(path)
            .map_err(|err| ReviewError::io(format!("open {}", path.display()), err))?;
        let mut options = entry_options();
        if let Some(mode) = permission_bits(&meta) {
            options = options.unix_permissions(mode);
        }
        self.zip.start_file(arcname, options)?;
        io::copy(&mut source, &mut self.zip)
            .map_err(|err| ReviewError::io(format!("compress {}", path.display()), err))?;
        self.entries.push(arcname.to_string());
        Ok(())
    }

    fn add_bytes(&mut self, arcname: &str, contents: &[u8]) -> Result<()> {
        self.zip.start_file(arcname, entry_options())?;
        io::Write::write_all(&mut self.zip, contents)
            .map_err(|err| ReviewError::io(format!("compress {arcname}"), err))?;
        self.entries.push(arcname.to_string());
        Ok(())
    }

    fn finish(self) -> Result<(Vec<String>, Vec<PathBuf>)> {
        self.zip.finish()?;
        Ok((self.entries, self.skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arcname_uses_forward_slashes_relative_to_root() {
        let root = Path::new("/repo");
        assert_eq!(arcname_for(root, Path::new("/repo/src/lib.rs")), "src/lib.rs");
        assert_eq!(
            arcname_for(root, Path::new("/repo/.git/refs/heads/main")),
            ".git/refs/heads/main"
        );
    }

    #[test]
    fn git_dir_relative_paths_are_detected() {
        assert!(is_git_dir_rel(".git"));
        assert!(is_git_dir_rel(".git/config"));
        assert!(!is_git_dir_rel(".gitignore"));
        assert!(!is_git_dir_rel("vendor/.git/config"));
    }

    #[test]
    fn sorted_files_walks_depth_first_by_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("refs/heads/feature")).expect("mkdir");
        fs::create_dir_all(root.join("refs/tags")).expect("mkdir");
        fs::write(root.join("refs/tags/v1"), "t").expect("write");
        fs::write(root.join("refs/heads/main"), "m").expect("write");
        fs::write(root.join("refs/heads/feature/x"), "x").expect("write");

        let names: Vec<String> = sorted_files(&root.join("refs"))
            .iter()
            .map(|p| arcname_for(root, p))
            .collect();
        assert_eq!(
            names,
            vec!["refs/heads/feature/x", "refs/heads/main", "refs/tags/v1"]
        );
    }

    #[test]
    fn writer_skips_vanished_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = File::create(temp.path().join("out.zip")).expect("create");
        let mut writer = BundleWriter::new(out);
        let missing = temp.path().join("gone.txt");
        writer.add_path(&missing, "gone.txt").expect("missing is not fatal");
        let (entries, skipped) = writer.finish().expect("finish");
        assert!(entries.is_empty());
        assert_eq!(skipped, vec![missing]);
    }
}
