//! Credential scrubbing for `.git/config` before it leaves the machine.
//!
//! CI systems routinely inject short-lived bearer tokens through
//! `http.<url>.extraHeader` and credentialed remote URLs. Everything else in
//! the config is structural and safe to disclose.

use std::sync::LazyLock;

use regex::Regex;

/// Replacement written in place of a credential value.
pub const REDACTED: &str = "<redacted>";

static EXTRA_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bextraheader\b").expect("extraheader regex"));

static URL_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*url\s*=\s*)(\S+)(\s*)$").expect("url line regex"));

// User-info runs to the last `@` before the first `/`; passwords may hold a raw `@`.
static HTTP_USERINFO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://)([^/\s]*@)(.+)$").expect("userinfo regex"));

/// Strip credentials from git config text.
///
/// - Lines mentioning `extraheader` keep their key and lose their value.
/// - `url = http(s)://user@host/...` loses the `user@` part.
/// - Every other line is passed through with trailing whitespace trimmed.
///
/// A trailing newline on the input is preserved. The transform is idempotent.
pub fn sanitize_git_config(raw: &str) -> String {
    let lines: Vec<String> = raw.lines().map(sanitize_line).collect();
    let mut out = lines.join("\n");
    if raw.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn sanitize_line(line: &str) -> String {
    if EXTRA_HEADER_RE.is_match(line) {
        return match line.split_once('=') {
            Some((prefix, _)) => format!("{prefix}= {REDACTED}"),
            None => REDACTED.to_string(),
        };
    }

    if let Some(caps) = URL_LINE_RE.captures(line) {
        let prefix = &caps[1];
        let url = strip_userinfo(&caps[2]);
        let suffix = &caps[3];
        return format!("{prefix}{url}{suffix}").trim_end().to_string();
    }

    line.trim_end().to_string()
}

fn strip_userinfo(url: &str) -> String {
    match HTTP_USERINFO_RE.captures(url) {
        Some(caps) => format!("{}{}", &caps[1], &caps[3]),
        None => url.to_string(),
    }
}
