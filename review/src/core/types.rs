//! Shared deterministic types for the review pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How much of the `.git` directory goes into the bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitInclusion {
    /// Omit `.git` entirely.
    None,
    /// Refs, HEAD, and a sanitized config only.
    #[default]
    Metadata,
    /// Every file under `.git` except lock files.
    Full,
}

impl GitInclusion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Metadata => "metadata",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for GitInclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GitInclusion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "metadata" => Ok(Self::Metadata),
            "full" => Ok(Self::Full),
            other => Err(format!(
                "unknown include-git value '{other}' (expected none, metadata, or full)"
            )),
        }
    }
}

/// Status of a remote review job.
///
/// Only `completed`, `failed`, and `canceled` end a wait. Anything else,
/// including statuses this crate does not know about, keeps polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Canceled,
    Other(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(raw) => raw,
        }
    }
}

/// Terminal state of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// The external result is available.
    Ready(T),
    /// The deadline passed before a result appeared.
    TimedOut { elapsed: std::time::Duration },
    /// The external side reported a terminal failure.
    ExternalFailure(T),
}
