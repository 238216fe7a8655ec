//! Extraction of a patch and follow-up steps from free-form model output.
//!
//! The reviewer is asked for a fixed three-section answer (feedback, a single
//! ```` ```diff ```` block, post-apply steps), but models drift from the format.
//! Callers only see [`extract_patch`] and [`extract_post_apply_steps`], so the
//! regex-based strategy here can change without touching them.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

const DIFF_HEADER: &str = "diff --git ";

static DIFF_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```diff\s*(.*?)\s*```").expect("diff fence regex"));

static STEPS_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:#+\s*)?post-apply steps\s*:?\s*$").expect("steps heading regex")
});

static ANY_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#+\s*\S+").expect("heading regex"));

/// Extract a unified diff from model output.
///
/// Prefers the first ```` ```diff ```` fenced block. Falls back to everything
/// from the first `diff --git ` header to the end of the text. The result is
/// trimmed and ends with exactly one newline.
pub fn extract_patch(text: &str) -> Option<String> {
    if let Some(caps) = DIFF_FENCE_RE.captures(text) {
        return Some(normalize_patch(&caps[1]));
    }
    text.find(DIFF_HEADER).map(|idx| normalize_patch(&text[idx..]))
}

fn normalize_patch(raw: &str) -> String {
    let mut patch = raw.trim().to_string();
    patch.push('\n');
    patch
}

/// Extract the body of the "Post-apply steps" section, if any.
///
/// The section runs from the heading to the next markdown heading or the end
/// of the text. Headings are assumed not to nest.
pub fn extract_post_apply_steps(text: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.find(|line| STEPS_HEADING_RE.is_match(line))?;

    let collected: Vec<&str> = lines
        .take_while(|line| !ANY_HEADING_RE.is_match(line))
        .collect();
    let steps = collected.join("\n").trim().to_string();
    (!steps.is_empty()).then_some(steps)
}

/// Pull the assistant text out of a Responses API payload.
///
/// Uses the convenience `output_text` field when it is present and non-blank,
/// otherwise joins every text content item across `output[]`.
pub fn extract_output_text(payload: &Value) -> String {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str)
        && !text.trim().is_empty()
    {
        return text.trim().to_string();
    }

    let mut texts: Vec<&str> = Vec::new();
    let items = payload
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for item in items {
        let contents = item
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for content in contents {
            let kind = content.get("type").and_then(Value::as_str);
            if !matches!(kind, Some("output_text" | "text")) {
                continue;
            }
            match content.get("text") {
                Some(Value::String(text)) => texts.push(text),
                Some(Value::Object(obj)) => {
                    if let Some(value) = obj.get("value").and_then(Value::as_str) {
                        texts.push(value);
                    }
                }
                _ => {}
            }
        }
    }
    texts.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FENCED: &str = "## Feedback\n- tighten error handling\n\n## Patch\n```diff\n\
diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-old\n+new\n```\n## Post-apply steps\nrun tests\n";

    #[test]
    fn fenced_block_wins_over_surrounding_prose() {
        let patch = extract_patch(FENCED).expect("patch");
        assert_eq!(
            patch,
            "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-old\n+new\n"
        );
    }

    #[test]
    fn first_fenced_block_is_used() {
        let text = "```diff\ndiff --git a/one b/one\n```\n\n```diff\ndiff --git a/two b/two\n```\n";
        assert_eq!(extract_patch(text).as_deref(), Some("diff --git a/one b/one\n"));
    }

    #[test]
    fn bare_header_returns_everything_after_it() {
        let text = "Here you go:\n\ndiff --git a/y b/y\n--- a/y\n+++ b/y\n@@ -1 +1 @@\n-a\n+b\n\n\n";
        assert_eq!(
            extract_patch(text).as_deref(),
            Some("diff --git a/y b/y\n--- a/y\n+++ b/y\n@@ -1 +1 @@\n-a\n+b\n")
        );
    }

    #[test]
    fn prose_without_diff_yields_none() {
        assert_eq!(extract_patch("Looks good to me, no changes needed."), None);
        assert_eq!(extract_patch(""), None);
    }

    #[test]
    fn steps_follow_heading_until_end() {
        assert_eq!(extract_post_apply_steps(FENCED).as_deref(), Some("run tests"));
    }

    #[test]
    fn steps_stop_at_next_heading() {
        let text = "Post-apply steps:\n- cargo test\n- cargo fmt\n\n# Notes\nignore me\n";
        assert_eq!(
            extract_post_apply_steps(text).as_deref(),
            Some("- cargo test\n- cargo fmt")
        );
    }

    #[test]
    fn steps_heading_is_case_insensitive() {
        let text = "### POST-APPLY STEPS\n1. make check\n";
        assert_eq!(extract_post_apply_steps(text).as_deref(), Some("1. make check"));
    }

    #[test]
    fn empty_steps_section_is_none() {
        assert_eq!(extract_post_apply_steps("## Post-apply steps\n\n## Done\n"), None);
        assert_eq!(extract_post_apply_steps("no heading here"), None);
    }

    #[test]
    fn output_text_field_is_preferred() {
        let payload = json!({
            "output_text": "  hello  ",
            "output": [{"content": [{"type": "output_text", "text": "ignored"}]}],
        });
        assert_eq!(extract_output_text(&payload), "hello");
    }

    #[test]
    fn output_items_are_joined() {
        let payload = json!({
            "output_text": "   ",
            "output": [
                {"type": "reasoning", "content": []},
                {"content": [
                    {"type": "output_text", "text": "first"},
                    {"type": "refusal", "text": "skip"},
                    {"type": "text", "text": {"value": "second"}},
                ]},
            ],
        });
        assert_eq!(extract_output_text(&payload), "first\nsecond");
    }

    #[test]
    fn missing_output_is_empty() {
        assert_eq!(extract_output_text(&json!({"status": "completed"})), "");
        assert_eq!(extract_output_text(&json!({"output": null})), "");
    }
}
