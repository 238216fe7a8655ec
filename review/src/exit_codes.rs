//! Stable exit codes for the `repo-review` CLI.

/// Run finished (bundle written, patch saved and applied as requested).
pub const OK: i32 = 0;
/// Any pipeline failure: git, bundling, remote job, extraction, gate, apply, timeout.
pub const FAILED: i32 = 1;
/// Invalid invocation: bad config, or remote mode without an API key or model.
pub const USAGE: i32 = 2;
