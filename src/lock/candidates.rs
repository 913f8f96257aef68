//! Discovery of lock files for stale cleanup.
//!
//! Cleanup works on a plain list of candidate paths chosen by a name
//! predicate, so the same sweep logic applies whatever backend produced the
//! list.

use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Result, TaskboardError};

/// Glob every lock-pattern file name matches.
pub const LOCK_PATTERN: &str = "*.lock";

fn lock_matcher() -> &'static GlobMatcher {
    static MATCHER: OnceLock<GlobMatcher> = OnceLock::new();
    MATCHER.get_or_init(|| {
        Glob::new(LOCK_PATTERN)
            .expect("lock glob is valid")
            .compile_matcher()
    })
}

/// Whether a file name looks like a lock file.
#[must_use]
pub fn is_lock_candidate(file_name: &str) -> bool {
    !file_name.is_empty() && lock_matcher().is_match(file_name)
}

/// List every lock-pattern file directly inside `dir`, sorted by path.
///
/// A missing directory yields an empty list.
pub fn list_lock_candidates(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TaskboardError::Io(e)),
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| is_lock_candidate(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_lock_candidate() {
        assert!(is_lock_candidate(".sync.lock"));
        assert!(is_lock_candidate("archive.lock"));
        assert!(!is_lock_candidate(".sync.guard"));
        assert!(!is_lock_candidate("PLAN.md"));
        assert!(!is_lock_candidate("lock"));
        assert!(!is_lock_candidate(""));
    }

    #[test]
    fn test_list_lock_candidates() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".sync.lock"), "{}").unwrap();
        fs::write(temp.path().join("other.lock"), "{}").unwrap();
        fs::write(temp.path().join("PLAN.md"), "- [ ] x").unwrap();
        fs::create_dir(temp.path().join("dir.lock")).unwrap();

        let found = list_lock_candidates(temp.path()).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![".sync.lock", "other.lock"]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let found = list_lock_candidates(&temp.path().join("nope")).unwrap();
        assert!(found.is_empty());
    }
}
