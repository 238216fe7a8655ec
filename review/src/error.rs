//! Error taxonomy for the bundle → review → apply pipeline.
//!
//! Every fatal condition has its own variant so callers can match on the kind
//! instead of string-sniffing. Missing files during bundling are not errors:
//! they are logged and recorded in [`crate::io::bundle::BundleReport`].

use std::path::PathBuf;
use std::time::Duration;

/// Errors produced by the review pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("not a git repository: {}", path.display())]
    NotAGitRepository { path: PathBuf },

    #[error(
        "bundle zip is {size} bytes, exceeds limit {limit}; \
         use --max-zip-bytes to raise the limit or set --include-git none"
    )]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("{operation} failed ({status}): {body}")]
    RemoteRequestFailed {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected {operation} payload: {detail}")]
    MalformedResponse {
        operation: &'static str,
        detail: String,
    },

    #[error("response {id} ended with status {status}")]
    RemoteJobFailed { id: String, status: String },

    #[error("no output text found in response")]
    MissingOutputText,

    #[error("no ```diff fenced patch found in {origin}")]
    NoExtractablePatch { origin: String },

    #[error("refusing to apply patch that touches .git/** (use --allow-git-dir-changes to override)")]
    InternalsTouched,

    #[error("failed to apply patch.\ngit apply error:\n{strict}\ngit apply --3way error:\n{three_way}")]
    PatchApplyFailed { strict: String, three_way: String },

    #[error("timed out waiting for {target} after {}s", elapsed.as_secs())]
    WaitTimedOut { target: String, elapsed: Duration },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("git {args} failed: {stderr}")]
    Git { args: String, stderr: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("render template: {0}")]
    Template(#[from] minijinja::Error),
}

impl ReviewError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ReviewError>;
