//! Blocking waits for a review result.
//!
//! Both waiting strategies (polling a remote job, re-reading a response file a
//! human is editing) run on [`poll_until`]: a fixed-interval loop under a
//! wall-clock deadline. The check always runs before the deadline test, so the
//! final read is evaluated before a timeout is reported.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::core::extract::extract_patch;
use crate::core::types::{JobStatus, WaitOutcome};
use crate::error::Result;
use crate::io::api::ReviewApi;

/// Fixed polling interval and overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Result of [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { elapsed: Duration },
}

/// Call `check` every `schedule.interval` until it yields a value or the
/// deadline passes. Errors from `check` end the loop immediately. A timeout
/// too large to represent as an `Instant` means no deadline.
pub fn poll_until<T, F>(schedule: PollSchedule, mut check: F) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Result<Option<T>>,
{
    let started = Instant::now();
    let deadline = started.checked_add(schedule.timeout);
    loop {
        if let Some(value) = check()? {
            return Ok(PollOutcome::Ready(value));
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(PollOutcome::TimedOut {
                elapsed: started.elapsed(),
            });
        }
        thread::sleep(schedule.interval);
    }
}

/// Poll a remote response until it reaches a terminal status.
///
/// `created` is the payload returned by create-job; it is checked before the
/// first `get_response` call. `completed` yields [`WaitOutcome::Ready`],
/// `failed` and `canceled` yield [`WaitOutcome::ExternalFailure`].
#[instrument(skip_all, fields(response_id = %response_id))]
pub fn wait_for_remote_job<A: ReviewApi>(
    api: &A,
    response_id: &str,
    created: Value,
    schedule: PollSchedule,
) -> Result<WaitOutcome<Value>> {
    let mut pending = Some(created);
    let outcome = poll_until(schedule, || {
        let payload = match pending.take() {
            Some(payload) => payload,
            None => api.get_response(response_id)?,
        };
        let status = job_status(&payload);
        if status.is_terminal() {
            return Ok(Some((status, payload)));
        }
        info!(status = status.as_str(), "waiting for response");
        Ok(None)
    })?;

    Ok(match outcome {
        PollOutcome::Ready((JobStatus::Completed, payload)) => WaitOutcome::Ready(payload),
        PollOutcome::Ready((_, payload)) => WaitOutcome::ExternalFailure(payload),
        PollOutcome::TimedOut { elapsed } => WaitOutcome::TimedOut { elapsed },
    })
}

/// Status field of a response payload.
pub fn job_status(payload: &Value) -> JobStatus {
    JobStatus::parse(payload.get("status").and_then(Value::as_str).unwrap_or_default())
}

/// What a single look at the response file found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Missing, unreadable, or identical to the last reading.
    Unchanged,
    /// New content that does not contain a patch yet.
    ChangedWithoutPatch,
    /// New content with an extractable patch.
    Ready(String),
}

/// Change-detecting reader for a response file a human fills in.
#[derive(Debug, Clone)]
pub struct ResponseFileWatcher {
    path: PathBuf,
    last_digest: Option<String>,
}

impl ResponseFileWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_digest: None,
        }
    }

    /// Read the file once and classify the reading.
    ///
    /// Only a content digest different from the previous reading counts as an
    /// event; an unchanged file never reaches patch extraction twice.
    pub fn poll_once(&mut self) -> FileEvent {
        if !self.path.is_file() {
            return FileEvent::Unchanged;
        }
        let text = match fs::read(&self.path) {
            Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
            Err(err) => {
                debug!(err = %err, path = %self.path.display(), "response file unreadable");
                return FileEvent::Unchanged;
            }
        };

        let digest = hex::encode(Sha256::digest(text.as_bytes()));
        if self.last_digest.as_deref() == Some(digest.as_str()) {
            return FileEvent::Unchanged;
        }
        self.last_digest = Some(digest);

        if extract_patch(&text).is_some() {
            return FileEvent::Ready(text);
        }
        if text.trim().is_empty() {
            return FileEvent::Unchanged;
        }
        FileEvent::ChangedWithoutPatch
    }
}

/// Wait until the response file at `path` contains a patch.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn wait_for_response_file(
    path: &Path,
    schedule: PollSchedule,
) -> Result<WaitOutcome<String>> {
    let mut watcher = ResponseFileWatcher::new(path);
    let outcome = poll_until(schedule, || {
        Ok(match watcher.poll_once() {
            FileEvent::Ready(text) => Some(text),
            FileEvent::ChangedWithoutPatch => {
                warn!(
                    "response detected but no ```diff fenced patch found yet; \
                     update the response file with a unified diff in a ```diff block"
                );
                None
            }
            FileEvent::Unchanged => None,
        })
    })?;

    Ok(match outcome {
        PollOutcome::Ready(text) => WaitOutcome::Ready(text),
        PollOutcome::TimedOut { elapsed } => WaitOutcome::TimedOut { elapsed },
    })
}
