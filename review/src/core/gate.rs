//! Refuse patches that write into `.git`.
//!
//! Only diff header lines are inspected (`diff --git`, `---`, `+++`). Paths
//! that use a prefix other than the conventional `a/` and `b/` are compared
//! as-is, so a header such as `--- x/.git/config` is not caught.

const GIT_DIR: &str = ".git";
const NULL_PATH: &str = "/dev/null";

/// True if any file header in `diff` names a path inside `.git`.
pub fn diff_touches_git_dir(diff: &str) -> bool {
    diff.lines().any(line_touches_git_dir)
}

fn line_touches_git_dir(line: &str) -> bool {
    if line.starts_with("diff --git ") {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return false;
        }
        let a_path = parts[2].strip_prefix("a/").unwrap_or(parts[2]);
        let b_path = parts[3].strip_prefix("b/").unwrap_or(parts[3]);
        return is_git_dir_path(a_path) || is_git_dir_path(b_path);
    }

    if line.starts_with("--- ") || line.starts_with("+++ ") {
        let Some(path) = line.split_whitespace().nth(1) else {
            return false;
        };
        if path == NULL_PATH {
            return false;
        }
        let path = path
            .strip_prefix("a/")
            .or_else(|| path.strip_prefix("b/"))
            .unwrap_or(path);
        return is_git_dir_path(path);
    }

    false
}

fn is_git_dir_path(path: &str) -> bool {
    path == GIT_DIR
        || path
            .strip_prefix(GIT_DIR)
            .is_some_and(|rest| rest.starts_with('/'))
}
