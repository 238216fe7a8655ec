//! Orchestration for a single review run.
//!
//! A run builds the bundle, obtains the reviewer's raw text (remote job,
//! response file, or stdin), then extracts, gates, saves, and applies the
//! patch. Each stage must succeed before the next one starts; artifacts
//! already written stay on disk when a later stage fails.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::extract::{extract_output_text, extract_patch, extract_post_apply_steps};
use crate::core::gate::diff_touches_git_dir;
use crate::core::types::{JobStatus, WaitOutcome};
use crate::error::{Result, ReviewError};
use crate::io::api::{ReviewApi, build_response_payload, payload_id};
use crate::io::apply::{ApplyStrategy, apply_patch};
use crate::io::artifacts::{ArtifactPaths, resolve_against, write_text};
use crate::io::bundle::{BundleOptions, BundleReport, create_bundle};
use crate::io::config::ReviewConfig;
use crate::io::git::Git;
use crate::io::prompt::PromptEngine;
use crate::io::wait::{job_status, wait_for_remote_job, wait_for_response_file};

/// Where a manual review response comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualInput {
    /// Poll this file until it contains a patch. `None` watches
    /// `response.md` in the artifact directory.
    File(Option<PathBuf>),
    /// Read standard input to EOF.
    Stdin,
}

/// How the review text is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewMode {
    /// Build the bundle and stop.
    BundleOnly,
    /// A human runs the review and hands back the response.
    Manual(ManualInput),
    /// Submit to the reviewing agent API and wait for the job.
    Remote,
}

/// Resolved inputs shared by every stage of a run.
#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub git: Git,
    pub artifacts: ArtifactPaths,
    pub config: ReviewConfig,
}

impl ReviewContext {
    /// Validate `config`, resolve the repository containing `repo`, and
    /// create the artifact directory.
    pub fn prepare(repo: &Path, config: ReviewConfig) -> Result<Self> {
        config.validate()?;
        let git = Git::discover(repo)?;
        let artifacts = ArtifactPaths::resolve(git.root(), config.artifact_dir.as_deref())?;
        Ok(Self {
            git,
            artifacts,
            config,
        })
    }

    pub fn repo_root(&self) -> &Path {
        self.git.root()
    }
}

/// Result of the extract → gate → save → apply tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub patch_path: PathBuf,
    /// `None` when applying was disabled.
    pub applied: Option<ApplyStrategy>,
    pub post_apply_steps: Option<String>,
}

/// Build `bundle.zip` for the context's repository.
pub fn build_bundle(ctx: &ReviewContext) -> Result<BundleReport> {
    create_bundle(
        &ctx.git,
        &ctx.artifacts.dir,
        &ctx.artifacts.bundle_path,
        BundleOptions {
            include_git: ctx.config.include_git,
            max_zip_bytes: ctx.config.max_zip_bytes,
        },
    )
}

/// Render the review prompt and save it as `prompt.md`.
pub fn write_prompt(ctx: &ReviewContext, engine: &PromptEngine) -> Result<String> {
    let prompt = engine.render_review(&ctx.config.message)?;
    write_text(&ctx.artifacts.prompt_path, &prompt)?;
    Ok(prompt)
}

/// Resolve the manual response file and create it empty if missing.
pub fn prepare_response_file(ctx: &ReviewContext, configured: Option<&Path>) -> Result<PathBuf> {
    let path = match configured {
        Some(path) => resolve_against(ctx.repo_root(), path),
        None => ctx.artifacts.response_md_path.clone(),
    };
    if !path.exists() {
        write_text(&path, "")?;
    }
    Ok(path)
}

/// Block until the manual response file contains a patch.
///
/// When the file lives outside the artifact directory its content is copied
/// into `response.md` so every run leaves the same artifacts behind.
#[instrument(skip_all, fields(path = %response_path.display()))]
pub fn await_manual_file(ctx: &ReviewContext, response_path: &Path) -> Result<String> {
    let schedule = ctx.config.poll_schedule();
    info!(
        timeout_minutes = ctx.config.timeout_minutes,
        "waiting for response"
    );
    let text = match wait_for_response_file(response_path, schedule)? {
        WaitOutcome::Ready(text) | WaitOutcome::ExternalFailure(text) => text,
        WaitOutcome::TimedOut { elapsed } => {
            return Err(ReviewError::WaitTimedOut {
                target: format!("manual response at {}", response_path.display()),
                elapsed,
            });
        }
    };
    if response_path != ctx.artifacts.response_md_path {
        write_text(&ctx.artifacts.response_md_path, &text)?;
    }
    Ok(text)
}

/// Read the manual response from `reader` until EOF and save it.
pub fn read_manual_response<R: Read>(ctx: &ReviewContext, mut reader: R) -> Result<String> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|err| ReviewError::io("read response from stdin", err))?;
    write_text(&ctx.artifacts.response_md_path, &text)?;
    Ok(text)
}

/// Submit the bundle to the reviewing agent and return its output text.
///
/// The uploaded file is deleted afterwards unless cleanup is disabled, even
/// when the job fails or times out. `response.json` and `response.md` are
/// written on the way out.
#[instrument(skip_all)]
pub fn run_remote<A: ReviewApi>(ctx: &ReviewContext, api: &A, prompt: &str) -> Result<String> {
    let file_id = api.upload_file(&ctx.artifacts.bundle_path)?;
    info!(file_id = %file_id, "uploaded bundle");

    let result = submit_and_wait(ctx, api, &file_id, prompt);

    if ctx.config.cleanup {
        match api.delete_file(&file_id) {
            Ok(()) => info!(file_id = %file_id, "deleted uploaded bundle"),
            Err(err) => {
                warn!(file_id = %file_id, err = %err, "failed to delete uploaded bundle");
            }
        }
    }

    let (response_id, payload) = result?;
    let pretty = serde_json::to_string_pretty(&payload)?;
    write_text(&ctx.artifacts.response_json_path, &pretty)?;

    let status = job_status(&payload);
    if matches!(status, JobStatus::Failed | JobStatus::Canceled) {
        return Err(ReviewError::RemoteJobFailed {
            id: response_id,
            status: status.as_str().to_string(),
        });
    }

    let text = extract_output_text(&payload);
    if text.is_empty() {
        return Err(ReviewError::MissingOutputText);
    }
    write_text(&ctx.artifacts.response_md_path, &text)?;
    info!(path = %ctx.artifacts.response_md_path.display(), "saved response");
    Ok(text)
}

fn submit_and_wait<A: ReviewApi>(
    ctx: &ReviewContext,
    api: &A,
    file_id: &str,
    prompt: &str,
) -> Result<(String, Value)> {
    let request = build_response_payload(
        &ctx.config.model,
        prompt,
        file_id,
        ctx.config.background,
    );
    let created = api.create_response(&request)?;
    let response_id = payload_id(&created, "create response")?;
    info!(response_id = %response_id, "created response");

    if !ctx.config.background {
        return Ok((response_id, created));
    }

    match wait_for_remote_job(api, &response_id, created, ctx.config.poll_schedule())? {
        WaitOutcome::Ready(payload) | WaitOutcome::ExternalFailure(payload) => {
            Ok((response_id, payload))
        }
        WaitOutcome::TimedOut { elapsed } => Err(ReviewError::WaitTimedOut {
            target: format!("response {response_id}"),
            elapsed,
        }),
    }
}

/// Extract, gate, save, and (optionally) apply the patch in `text`.
#[instrument(skip_all)]
pub fn finish_review(ctx: &ReviewContext, text: &str) -> Result<PatchOutcome> {
    let patch = extract_patch(text).ok_or_else(|| ReviewError::NoExtractablePatch {
        origin: ctx.artifacts.response_md_path.display().to_string(),
    })?;

    if !ctx.config.allow_git_dir_changes && diff_touches_git_dir(&patch) {
        return Err(ReviewError::InternalsTouched);
    }
    if ctx.config.allow_git_dir_changes && diff_touches_git_dir(&patch) {
        warn!("patch touches .git/**; applying because the override is set");
    }

    let patch_path = ctx.artifacts.patch_path.clone();
    write_text(&patch_path, &patch)?;
    info!(path = %patch_path.display(), "saved patch");

    let applied = if ctx.config.apply {
        Some(apply_patch(&ctx.git, &patch_path)?)
    } else {
        None
    };

    Ok(PatchOutcome {
        patch_path,
        applied,
        post_apply_steps: extract_post_apply_steps(text),
    })
}
