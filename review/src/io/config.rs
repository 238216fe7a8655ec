//! Review configuration, optionally loaded from a TOML file.
//!
//! The CLI builds one [`ReviewConfig`] at startup (file values first, then
//! flags and environment on top) and passes it down by reference. Nothing
//! below the CLI reads the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::GitInclusion;
use crate::error::{Result, ReviewError};
use crate::io::api::DEFAULT_BASE_URL;
use crate::io::wait::PollSchedule;

pub const DEFAULT_MESSAGE: &str = "Review this repository and propose a focused patch improving correctness, security, and maintainability.";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 90;
pub const DEFAULT_MAX_ZIP_BYTES: u64 = 100 * 1024 * 1024;

/// Review configuration (TOML).
///
/// Missing fields take the defaults below, so a file only needs the values
/// it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReviewConfig {
    /// API base URL of the reviewing agent.
    pub base_url: String,

    /// Model id. Required for remote reviews only.
    pub model: String,

    /// Request text appended to the review prompt.
    pub message: String,

    pub include_git: GitInclusion,

    /// Artifact directory; relative paths resolve against the repository root.
    pub artifact_dir: Option<PathBuf>,

    /// Abort if `bundle.zip` exceeds this many bytes.
    pub max_zip_bytes: u64,

    pub poll_interval_secs: u64,

    /// Give up waiting after this many minutes.
    pub timeout_minutes: u64,

    /// Run the remote job in background mode and poll for it.
    pub background: bool,

    /// Apply the extracted patch to the work tree.
    pub apply: bool,

    /// Delete the uploaded bundle when the remote review ends.
    pub cleanup: bool,

    /// Allow patches that touch `.git/**`. Unsafe.
    pub allow_git_dir_changes: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: String::new(),
            message: DEFAULT_MESSAGE.to_string(),
            include_git: GitInclusion::default(),
            artifact_dir: None,
            max_zip_bytes: DEFAULT_MAX_ZIP_BYTES,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            background: true,
            apply: true,
            cleanup: true,
            allow_git_dir_changes: false,
        }
    }
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(ReviewError::InvalidConfig(
                "poll_interval_secs must be >= 1".to_string(),
            ));
        }
        if self.timeout_minutes == 0 {
            return Err(ReviewError::InvalidConfig(
                "timeout_minutes must be > 0".to_string(),
            ));
        }
        if self.max_zip_bytes == 0 {
            return Err(ReviewError::InvalidConfig(
                "max_zip_bytes must be > 0".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(ReviewError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll interval and deadline shared by both wait modes.
    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.timeout_minutes.saturating_mul(60)),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReviewConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReviewConfig> {
    if !path.exists() {
        let cfg = ReviewConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path)
        .map_err(|err| ReviewError::io(format!("read {}", path.display()), err))?;
    let cfg: ReviewConfig = toml::from_str(&contents)
        .map_err(|err| ReviewError::InvalidConfig(format!("parse {}: {err}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}
