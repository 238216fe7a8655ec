//! Two-tier patch application.
//!
//! Model-written diffs are usually right in intent but off in exact context
//! lines. A strict apply is tried first; `--3way` can then recover divergent
//! context from the blobs git already has. Nothing fuzzier is attempted.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::error::{Result, ReviewError};
use crate::io::git::Git;

/// Which strategy ended up applying the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStrategy {
    Strict,
    ThreeWay,
}

/// Apply `patch_path` to the work tree at `git.root()`.
///
/// Returns [`ReviewError::PatchApplyFailed`] with both attempts' stderr when
/// neither strategy succeeds.
#[instrument(skip_all, fields(patch = %patch_path.display()))]
pub fn apply_patch(git: &Git, patch_path: &Path) -> Result<ApplyStrategy> {
    let strict = git.apply(patch_path, false)?;
    if strict.success {
        info!("patch applied");
        return Ok(ApplyStrategy::Strict);
    }

    warn!(stderr = %strict.stderr.trim(), "strict apply failed; retrying with --3way");
    let three_way = git.apply(patch_path, true)?;
    if three_way.success {
        info!("patch applied with --3way");
        return Ok(ApplyStrategy::ThreeWay);
    }

    Err(ReviewError::PatchApplyFailed {
        strict: strict.stderr,
        three_way: three_way.stderr,
    })
}
