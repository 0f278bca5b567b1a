use crate::format::join_extension;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Highest `_N` suffix tried before giving up on a candidate.
pub const DEFAULT_DISAMBIGUATOR_LIMIT: u32 = 99_999;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no free name for {candidate} within {limit} disambiguators")]
pub struct CollisionExhausted {
    pub candidate: String,
    pub limit: u32,
}

/// Picks `base.ext`, or the first free `base_N.ext` with the lowest `N`.
pub fn resolve_name(
    base: &str,
    extension: Option<&str>,
    is_taken: impl Fn(&str) -> bool,
    limit: u32,
) -> Result<String, CollisionExhausted> {
    let candidate = join_extension(base, extension);
    if !is_taken(&candidate) {
        return Ok(candidate);
    }

    for n in 1..=limit {
        let name = join_extension(&format!("{}_{}", base, n), extension);
        if !is_taken(&name) {
            return Ok(name);
        }
    }

    Err(CollisionExhausted { candidate, limit })
}

/// Names handed out so far in a batch, plus sources that were renamed away
/// and whose on-disk names are therefore free again.
#[derive(Debug, Clone, Default)]
pub struct ClaimedNames {
    claimed: HashSet<PathBuf>,
    released: HashSet<PathBuf>,
}

impl ClaimedNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.claimed.contains(path)
    }

    pub fn is_released(&self, path: &Path) -> bool {
        self.released.contains(path)
    }

    /// Taken means claimed in this batch, or present on disk and not
    /// vacated by an earlier rename.
    pub fn is_taken(&self, path: &Path, exists_on_disk: bool) -> bool {
        self.is_claimed(path) || (exists_on_disk && !self.is_released(path))
    }

    /// Records the outcome for one source; a source that keeps its name
    /// claims it, a renamed source vacates its old name.
    pub fn record(&mut self, source: &Path, target: &Path) {
        if source != target {
            self.released.insert(source.to_path_buf());
        }
        self.released.remove(target);
        self.claimed.insert(target.to_path_buf());
    }
}
