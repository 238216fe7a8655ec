//! Repository review CLI.
//!
//! Bundles the git repository into `.codex-review/bundle.zip`, obtains a
//! review (remote agent, or a human in `--manual` mode), and applies the
//! returned patch to the work tree.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use repo_review::core::types::GitInclusion;
use repo_review::error::ReviewError;
use repo_review::exit_codes;
use repo_review::io::api::OpenAiClient;
use repo_review::io::apply::ApplyStrategy;
use repo_review::io::config::{ReviewConfig, load_config};
use repo_review::io::prompt::PromptEngine;
use repo_review::logging;
use repo_review::review::{
    ManualInput, ReviewContext, ReviewMode, await_manual_file, build_bundle, finish_review,
    prepare_response_file, read_manual_response, run_remote, write_prompt,
};

#[derive(Parser, Debug)]
#[command(
    name = "repo-review",
    version,
    about = "Bundle a git repository for review and apply the returned patch"
)]
struct Cli {
    /// Path inside the repository to review.
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// TOML config file. Missing file means defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model id for remote reviews.
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// API base URL.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Review request appended to the prompt.
    #[arg(long)]
    message: Option<String>,

    /// How much of `.git` to bundle: none, metadata, or full.
    #[arg(long)]
    include_git: Option<GitInclusion>,

    /// Artifact directory (relative paths resolve against the repo root).
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    #[arg(long)]
    max_zip_bytes: Option<u64>,

    /// Build the bundle and exit.
    #[arg(long, conflicts_with = "manual")]
    bundle_only: bool,

    /// Skip the API; wait for a human to provide the response.
    #[arg(long)]
    manual: bool,

    #[arg(long, value_enum, default_value_t = ManualSource::File, requires = "manual")]
    manual_input: ManualSource,

    /// Response file to watch in manual mode. Defaults to `response.md` in
    /// the artifact directory.
    #[arg(long, requires = "manual")]
    manual_response_path: Option<PathBuf>,

    /// Wait for the remote response inline instead of polling a background job.
    #[arg(long)]
    no_background: bool,

    #[arg(long)]
    poll_interval_seconds: Option<u64>,

    #[arg(long)]
    timeout_minutes: Option<u64>,

    /// Save the patch without applying it.
    #[arg(long)]
    no_apply: bool,

    /// Allow patches that modify `.git/**`. Unsafe.
    #[arg(long)]
    allow_git_dir_changes: bool,

    /// Keep the uploaded bundle on the remote side.
    #[arg(long)]
    no_cleanup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ManualSource {
    File,
    Stdin,
}

/// Invocation that cannot run at all; exits with [`exit_codes::USAGE`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct UsageError(&'static str);

impl Cli {
    fn mode(&self) -> ReviewMode {
        if self.bundle_only {
            ReviewMode::BundleOnly
        } else if self.manual {
            match self.manual_input {
                ManualSource::Stdin => ReviewMode::Manual(ManualInput::Stdin),
                ManualSource::File => {
                    ReviewMode::Manual(ManualInput::File(self.manual_response_path.clone()))
                }
            }
        } else {
            ReviewMode::Remote
        }
    }

    /// File values first, then flags and environment on top.
    fn review_config(&self) -> Result<ReviewConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ReviewConfig::default(),
        };
        if let Some(model) = &self.model {
            config.model.clone_from(model);
        }
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(message) = &self.message {
            config.message.clone_from(message);
        }
        if let Some(include_git) = self.include_git {
            config.include_git = include_git;
        }
        if let Some(dir) = &self.artifact_dir {
            config.artifact_dir = Some(dir.clone());
        }
        if let Some(limit) = self.max_zip_bytes {
            config.max_zip_bytes = limit;
        }
        if let Some(secs) = self.poll_interval_seconds {
            config.poll_interval_secs = secs;
        }
        if let Some(minutes) = self.timeout_minutes {
            config.timeout_minutes = minutes;
        }
        if self.no_background {
            config.background = false;
        }
        if self.no_apply {
            config.apply = false;
        }
        if self.no_cleanup {
            config.cleanup = false;
        }
        if self.allow_git_dir_changes {
            config.allow_git_dir_changes = true;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("{err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() {
        return exit_codes::USAGE;
    }
    match err.downcast_ref::<ReviewError>() {
        Some(ReviewError::InvalidConfig(_)) => exit_codes::USAGE,
        _ => exit_codes::FAILED,
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.review_config()?;
    let mode = cli.mode();

    let api_key = if mode == ReviewMode::Remote {
        let key = cli
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(UsageError(
                "OPENAI_API_KEY is not set (use --manual for a manual review)",
            ))?;
        if config.model.trim().is_empty() {
            return Err(UsageError("model is required (set --model or OPENAI_MODEL)").into());
        }
        Some(key)
    } else {
        None
    };

    let ctx = ReviewContext::prepare(&cli.repo, config)?;
    let report = build_bundle(&ctx).context("build bundle")?;
    println!("Artifacts: {}", ctx.artifacts.dir.display());
    println!(
        "Bundle: {} ({} bytes, {} entries)",
        report.path.display(),
        report.size,
        report.entries.len()
    );

    let engine = PromptEngine::new();
    let text = match mode {
        ReviewMode::BundleOnly => return Ok(()),
        ReviewMode::Manual(input) => {
            write_prompt(&ctx, &engine)?;
            match input {
                ManualInput::File(path) => {
                    let response_path = prepare_response_file(&ctx, path.as_deref())?;
                    println!(
                        "{}",
                        engine.render_manual(
                            &ctx.artifacts.bundle_path,
                            &ctx.artifacts.prompt_path,
                            &response_path,
                            false,
                        )?
                    );
                    await_manual_file(&ctx, &response_path).context("wait for manual response")?
                }
                ManualInput::Stdin => {
                    println!(
                        "{}",
                        engine.render_manual(
                            &ctx.artifacts.bundle_path,
                            &ctx.artifacts.prompt_path,
                            &ctx.artifacts.response_md_path,
                            true,
                        )?
                    );
                    read_manual_response(&ctx, io::stdin().lock())?
                }
            }
        }
        ReviewMode::Remote => {
            let prompt = write_prompt(&ctx, &engine)?;
            let key = api_key.unwrap_or_default();
            let client = OpenAiClient::new(key, &ctx.config.base_url)?;
            run_remote(&ctx, &client, &prompt).context("remote review")?
        }
    };

    let outcome = finish_review(&ctx, &text)?;
    println!("Response: {}", ctx.artifacts.response_md_path.display());
    println!("Patch: {}", outcome.patch_path.display());
    match outcome.applied {
        Some(ApplyStrategy::Strict) => println!("Applied patch."),
        Some(ApplyStrategy::ThreeWay) => println!("Applied patch with --3way."),
        None => println!("Patch not applied (--no-apply)."),
    }
    if let Some(steps) = outcome.post_apply_steps {
        println!("\nPost-apply steps:\n{steps}");
    }
    Ok(())
}
