//! End-to-end review runs: bundle, obtain a response, then extract, gate,
//! save, and apply the patch.

use std::fs;
use std::path::Path;

use repo_review::error::ReviewError;
use repo_review::io::apply::ApplyStrategy;
use repo_review::io::config::ReviewConfig;
use repo_review::io::prompt::PromptEngine;
use repo_review::review::{
    ReviewContext, await_manual_file, build_bundle, finish_review, prepare_response_file,
    read_manual_response, run_remote, write_prompt,
};
use repo_review::test_support::{ScriptedApi, TestRepo, response_payload};
use serde_json::Value;

const RESPONSE: &str = "## Feedback\nGreeting is too terse.\n\n## Patch\n```diff\ndiff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-hello\n+hello, world\n```\n\n## Post-apply steps\nrun tests\n";

const EXPECTED_PATCH: &str =
    "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-hello\n+hello, world\n";

fn test_config() -> ReviewConfig {
    ReviewConfig {
        model: "gpt-test".to_string(),
        poll_interval_secs: 1,
        timeout_minutes: 1,
        ..ReviewConfig::default()
    }
}

fn committed_repo() -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    repo.write("a.txt", "hello\n").expect("write");
    repo.commit_all("init").expect("commit");
    repo
}

fn prepared(repo: &TestRepo, config: ReviewConfig) -> ReviewContext {
    let ctx = ReviewContext::prepare(repo.path(), config).expect("prepare");
    build_bundle(&ctx).expect("bundle");
    ctx
}

#[test]
fn manual_file_response_is_applied() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    write_prompt(&ctx, &PromptEngine::new()).expect("prompt");

    let response_path = prepare_response_file(&ctx, None).expect("response file");
    assert_eq!(response_path, ctx.artifacts.response_md_path);
    assert_eq!(fs::read_to_string(&response_path).expect("read"), "");
    fs::write(&response_path, RESPONSE).expect("write response");

    let text = await_manual_file(&ctx, &response_path).expect("wait");
    let outcome = finish_review(&ctx, &text).expect("finish");

    assert_eq!(outcome.applied, Some(ApplyStrategy::Strict));
    assert_eq!(outcome.post_apply_steps.as_deref(), Some("run tests"));
    assert_eq!(
        fs::read_to_string(&outcome.patch_path).expect("patch"),
        EXPECTED_PATCH
    );
    assert_eq!(repo.read("a.txt").expect("a.txt"), "hello, world\n");
    assert!(ctx.artifacts.prompt_path.is_file());
    assert!(ctx.artifacts.bundle_path.is_file());
}

#[test]
fn separate_response_file_is_copied_into_response_md() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());

    let response_path =
        prepare_response_file(&ctx, Some(Path::new("reviews/answer.md"))).expect("response file");
    assert_eq!(response_path, ctx.repo_root().join("reviews/answer.md"));
    fs::write(&response_path, RESPONSE).expect("write response");

    let text = await_manual_file(&ctx, &response_path).expect("wait");
    assert_eq!(text, RESPONSE);
    assert_eq!(
        fs::read_to_string(&ctx.artifacts.response_md_path).expect("response.md"),
        RESPONSE
    );
}

#[test]
fn existing_response_file_is_not_truncated() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    fs::write(&ctx.artifacts.response_md_path, "draft").expect("write");

    prepare_response_file(&ctx, None).expect("response file");
    assert_eq!(
        fs::read_to_string(&ctx.artifacts.response_md_path).expect("read"),
        "draft"
    );
}

#[test]
fn stdin_response_is_saved_and_applied() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());

    let text = read_manual_response(&ctx, RESPONSE.as_bytes()).expect("read");
    assert_eq!(
        fs::read_to_string(&ctx.artifacts.response_md_path).expect("response.md"),
        RESPONSE
    );
    let outcome = finish_review(&ctx, &text).expect("finish");
    assert_eq!(outcome.applied, Some(ApplyStrategy::Strict));
}

#[test]
fn no_apply_saves_patch_and_leaves_tree_alone() {
    let repo = committed_repo();
    let config = ReviewConfig {
        apply: false,
        ..test_config()
    };
    let ctx = prepared(&repo, config);

    let outcome = finish_review(&ctx, RESPONSE).expect("finish");
    assert_eq!(outcome.applied, None);
    assert!(outcome.patch_path.is_file());
    assert_eq!(repo.read("a.txt").expect("a.txt"), "hello\n");
}

#[test]
fn patch_touching_git_dir_is_refused() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    let response = "```diff\ndiff --git a/.git/config b/.git/config\n--- a/.git/config\n+++ b/.git/config\n@@ -1 +1 @@\n-x\n+y\n```\n";

    let err = finish_review(&ctx, response).expect_err("gate");
    assert!(matches!(err, ReviewError::InternalsTouched));
    assert!(!ctx.artifacts.patch_path.exists());
}

#[test]
fn response_without_patch_is_an_error() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());

    let err = finish_review(&ctx, "## Feedback\nAll good.\n").expect_err("no patch");
    assert!(matches!(err, ReviewError::NoExtractablePatch { .. }));
}

#[test]
fn conflicting_patch_reports_both_attempts() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    let response = "```diff\ndiff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-goodbye\n+farewell\n```\n";

    let err = finish_review(&ctx, response).expect_err("apply fails");
    match err {
        ReviewError::PatchApplyFailed { strict, three_way } => {
            assert!(!strict.is_empty());
            assert!(!three_way.is_empty());
        }
        other => panic!("expected PatchApplyFailed, got {other:?}"),
    }
    assert!(ctx.artifacts.patch_path.is_file());
    assert_eq!(repo.read("a.txt").expect("a.txt"), "hello\n");
}

#[test]
fn stale_context_falls_back_to_three_way() {
    let repo = TestRepo::new().expect("repo");
    let v1 = "l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\nl9\n";
    repo.write("a.txt", v1).expect("write v1");
    repo.commit_all("v1").expect("commit v1");

    // Patch made against v1, touching l8 with l5 in its context.
    repo.write("a.txt", &v1.replace("l8", "L8")).expect("edit");
    let patch = repo.git(&["diff", "--full-index"]).expect("diff");
    repo.git(&["checkout", "--", "a.txt"]).expect("restore");

    repo.write("a.txt", &v1.replace("l5", "L5")).expect("write v2");
    repo.commit_all("v2").expect("commit v2");

    let ctx = prepared(&repo, test_config());
    let response = format!("## Patch\n```diff\n{patch}```\n");

    let outcome = finish_review(&ctx, &response).expect("finish");
    assert_eq!(outcome.applied, Some(ApplyStrategy::ThreeWay));
    assert_eq!(
        repo.read("a.txt").expect("a.txt"),
        "l1\nl2\nl3\nl4\nL5\nl6\nl7\nL8\nl9\n"
    );
}

#[test]
fn remote_review_completed_on_create() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    let prompt = write_prompt(&ctx, &PromptEngine::new()).expect("prompt");
    let api = ScriptedApi::new(
        response_payload("resp_1", "completed", Some(RESPONSE)),
        Vec::new(),
    );

    let text = run_remote(&ctx, &api, &prompt).expect("remote");

    assert_eq!(text, RESPONSE.trim());
    assert_eq!(api.uploads(), vec![ctx.artifacts.bundle_path.clone()]);
    assert_eq!(api.poll_count(), 0);
    assert_eq!(api.deleted(), vec![api.file_id().to_string()]);

    let request = &api.requests()[0];
    assert_eq!(request["model"], "gpt-test");
    assert_eq!(request["background"], true);
    assert_eq!(request["input"][0]["content"][0]["text"], prompt.as_str());
    assert_eq!(request["input"][0]["content"][1]["file_id"], api.file_id());

    let saved: Value = serde_json::from_str(
        &fs::read_to_string(&ctx.artifacts.response_json_path).expect("response.json"),
    )
    .expect("json");
    assert_eq!(saved["id"], "resp_1");
    assert_eq!(
        fs::read_to_string(&ctx.artifacts.response_md_path).expect("response.md"),
        RESPONSE.trim()
    );

    let outcome = finish_review(&ctx, &text).expect("finish");
    assert_eq!(outcome.applied, Some(ApplyStrategy::Strict));
    assert_eq!(repo.read("a.txt").expect("a.txt"), "hello, world\n");
}

#[test]
fn remote_review_polls_until_completed() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    let api = ScriptedApi::new(
        response_payload("resp_2", "queued", None),
        vec![
            response_payload("resp_2", "in_progress", None),
            response_payload("resp_2", "completed", Some(RESPONSE)),
        ],
    );

    let text = run_remote(&ctx, &api, "prompt").expect("remote");
    assert_eq!(text, RESPONSE.trim());
    assert_eq!(api.poll_count(), 2);
}

#[test]
fn remote_failure_still_cleans_up_and_saves_payload() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    let api = ScriptedApi::new(response_payload("resp_3", "failed", None), Vec::new());

    let err = run_remote(&ctx, &api, "prompt").expect_err("failed job");
    match err {
        ReviewError::RemoteJobFailed { id, status } => {
            assert_eq!(id, "resp_3");
            assert_eq!(status, "failed");
        }
        other => panic!("expected RemoteJobFailed, got {other:?}"),
    }
    assert_eq!(api.deleted(), vec![api.file_id().to_string()]);
    assert!(ctx.artifacts.response_json_path.is_file());
}

#[test]
fn no_cleanup_keeps_uploaded_file() {
    let repo = committed_repo();
    let config = ReviewConfig {
        cleanup: false,
        ..test_config()
    };
    let ctx = prepared(&repo, config);
    let api = ScriptedApi::new(
        response_payload("resp_4", "completed", Some(RESPONSE)),
        Vec::new(),
    );

    run_remote(&ctx, &api, "prompt").expect("remote");
    assert!(api.deleted().is_empty());
}

#[test]
fn delete_failure_is_not_fatal() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    let api = ScriptedApi::new(
        response_payload("resp_5", "completed", Some(RESPONSE)),
        Vec::new(),
    )
    .failing_delete();

    let text = run_remote(&ctx, &api, "prompt").expect("remote");
    assert_eq!(text, RESPONSE.trim());
    assert_eq!(api.deleted().len(), 1);
}

#[test]
fn foreground_mode_uses_create_payload_without_polling() {
    let repo = committed_repo();
    let config = ReviewConfig {
        background: false,
        ..test_config()
    };
    let ctx = prepared(&repo, config);
    let api = ScriptedApi::new(
        response_payload("resp_6", "completed", Some(RESPONSE)),
        vec![response_payload("resp_6", "failed", None)],
    );

    run_remote(&ctx, &api, "prompt").expect("remote");
    assert_eq!(api.poll_count(), 0);
    assert_eq!(api.requests()[0]["background"], false);
}

#[test]
fn completed_response_without_text_is_an_error() {
    let repo = committed_repo();
    let ctx = prepared(&repo, test_config());
    let api = ScriptedApi::new(response_payload("resp_7", "completed", None), Vec::new());

    let err = run_remote(&ctx, &api, "prompt").expect_err("no text");
    assert!(matches!(err, ReviewError::MissingOutputText));
}
