//! Advisory task-directory locks with staleness detection.
//!
//! Each task directory carries at most one sidecar lock file
//! ([`LOCK_FILE`]) holding a [`LockRecord`]. Acquisition is non-blocking:
//! a live record is a definite rejection, a stale or malformed record is
//! removed and acquisition retried exactly once.
//!
//! The check-then-create section of acquire/release/cleanup is serialized
//! across processes with an `fs2` exclusive lock on a guard file, and lock
//! records are written through a temp file plus rename, so readers never see
//! a half-written record.
//!
//! # Example
//!
//! ```no_run
//! use taskboard::lock::LockManager;
//! use std::path::Path;
//!
//! let locks = LockManager::default();
//! let dir = Path::new("comm/backend/task-1");
//! let written = locks.with_lock(dir, "write-task", || {
//!     std::fs::write(dir.join("PLAN.md"), "- [ ] **Step**")?;
//!     Ok(())
//! });
//! ```

pub mod candidates;
pub mod record;

use chrono::{Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use candidates::{is_lock_candidate, list_lock_candidates, LOCK_PATTERN};
pub use record::LockRecord;

use crate::error::{IntoTaskboardError, Result, TaskboardError};

/// Canonical lock file name inside a task directory.
pub const LOCK_FILE: &str = ".sync.lock";

/// Guard file used to serialize lock bookkeeping across processes.
pub const GUARD_FILE: &str = ".sync.guard";

/// Default staleness timeout in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Results
// ============================================================================

/// Outcome of [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockAcquisition {
    pub acquired: bool,
    pub lock_id: Option<String>,
    pub reason: Option<String>,
}

impl LockAcquisition {
    fn granted(lock_id: String) -> Self {
        Self {
            acquired: true,
            lock_id: Some(lock_id),
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            acquired: false,
            lock_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Outcome of [`LockManager::release`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRelease {
    pub released: bool,
    pub reason: Option<String>,
}

/// Read-only view of a directory's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub is_locked: bool,
    pub lock_info: Option<LockRecord>,
    pub is_stale: bool,
}

/// What the lock file currently holds.
enum Existing {
    Absent,
    Malformed,
    Record(LockRecord),
}

// ============================================================================
// Lock Manager
// ============================================================================

/// Stateless lock service over per-directory sidecar files.
#[derive(Debug, Clone)]
pub struct LockManager {
    timeout: Duration,
    pid: u32,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS))
    }
}

impl LockManager {
    /// Create a manager for the current process.
    #[must_use]
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            timeout: Duration::from_std(timeout).unwrap_or(Duration::seconds(
                DEFAULT_LOCK_TIMEOUT_SECS as i64,
            )),
            pid: std::process::id(),
        }
    }

    /// Act on behalf of another process id (tests, supervisors).
    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Process id this manager writes into records.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Staleness timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Path of the canonical lock file for a directory.
    #[must_use]
    pub fn lock_path(dir: &Path) -> PathBuf {
        dir.join(LOCK_FILE)
    }

    // ------------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------------

    /// Try to take the lock on `dir` for `tool`.
    ///
    /// Never blocks on another holder: a live lock yields
    /// `acquired = false` with a reason naming the holder.
    pub fn acquire(&self, dir: &Path, tool: &str) -> Result<LockAcquisition> {
        require_non_empty("dir", &dir.to_string_lossy())?;
        require_non_empty("tool", tool)?;
        if !dir.is_dir() {
            return Err(TaskboardError::invalid_argument(
                "dir",
                format!("{} is not a directory", dir.display()),
            ));
        }

        let _guard = self.guard(dir)?;
        let path = Self::lock_path(dir);

        // One attempt plus one retry after clearing a stale/malformed record
        for attempt in 0..2 {
            match read_existing(&path)? {
                Existing::Absent => {
                    let record = LockRecord::new(tool, self.pid);
                    write_record(dir, &path, &record)?;
                    debug!(dir = %dir.display(), tool, lock_id = %record.lock_id, "Lock acquired");
                    return Ok(LockAcquisition::granted(record.lock_id));
                }
                Existing::Malformed => {
                    warn!(path = %path.display(), "Removing malformed lock record");
                    remove_if_exists(&path)?;
                }
                Existing::Record(record) => {
                    let now = Utc::now();
                    if !record.is_stale_at(now, self.timeout) {
                        let reason = format!("Task locked: {}", record.describe(now));
                        debug!(dir = %dir.display(), tool, %reason, "Lock denied");
                        return Ok(LockAcquisition::denied(reason));
                    }
                    info!(
                        dir = %dir.display(),
                        holder = %record.tool,
                        holder_pid = record.pid,
                        attempt,
                        "Reclaiming stale lock"
                    );
                    remove_if_exists(&path)?;
                }
            }
        }

        Ok(LockAcquisition::denied(
            "Lock could not be acquired after clearing a stale record",
        ))
    }

    /// Release the lock on `dir` if this process owns it under `lock_id`.
    pub fn release(&self, dir: &Path, lock_id: &str) -> Result<LockRelease> {
        require_non_empty("dir", &dir.to_string_lossy())?;
        require_non_empty("lock_id", lock_id)?;

        let path = Self::lock_path(dir);
        if !path.exists() {
            return Ok(LockRelease {
                released: true,
                reason: Some("already released".to_string()),
            });
        }

        let _guard = self.guard(dir)?;
        match read_existing(&path)? {
            Existing::Absent => Ok(LockRelease {
                released: true,
                reason: Some("already released".to_string()),
            }),
            Existing::Malformed => {
                warn!(path = %path.display(), "Removing malformed lock record on release");
                remove_if_exists(&path)?;
                Ok(LockRelease {
                    released: true,
                    reason: Some("malformed lock record removed".to_string()),
                })
            }
            Existing::Record(record) if record.is_owned_by(self.pid, lock_id) => {
                remove_if_exists(&path)?;
                debug!(dir = %dir.display(), lock_id, "Lock released");
                Ok(LockRelease {
                    released: true,
                    reason: None,
                })
            }
            Existing::Record(record) => Ok(LockRelease {
                released: false,
                reason: Some(format!(
                    "not owner: lock {}",
                    record.describe(Utc::now())
                )),
            }),
        }
    }

    /// Inspect the lock on `dir` without touching it.
    ///
    /// A malformed record reports as locked and stale, since the next
    /// acquirer will clear it.
    pub fn check_lock(&self, dir: &Path) -> Result<LockStatus> {
        require_non_empty("dir", &dir.to_string_lossy())?;
        let status = match read_existing(&Self::lock_path(dir))? {
            Existing::Absent => LockStatus {
                is_locked: false,
                lock_info: None,
                is_stale: false,
            },
            Existing::Malformed => LockStatus {
                is_locked: true,
                lock_info: None,
                is_stale: true,
            },
            Existing::Record(record) => LockStatus {
                is_locked: true,
                is_stale: record.is_stale_at(Utc::now(), self.timeout),
                lock_info: Some(record),
            },
        };
        Ok(status)
    }

    /// Remove every stale or malformed lock-pattern file in `dir`.
    ///
    /// Individual removal failures are logged and skipped. Returns the files
    /// actually removed.
    pub fn cleanup_stale_locks(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        require_non_empty("dir", &dir.to_string_lossy())?;
        let candidates = list_lock_candidates(dir)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.guard(dir)?;
        let now = Utc::now();
        let mut removed = Vec::new();

        for path in candidates {
            let stale = match read_existing(&path) {
                Ok(Existing::Absent) => continue,
                Ok(Existing::Malformed) => true,
                Ok(Existing::Record(record)) => record.is_stale_at(now, self.timeout),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable lock file");
                    continue;
                }
            };
            if !stale {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed stale lock");
                    removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Stale lock already gone");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale lock");
                }
            }
        }

        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Scoped locking
    // ------------------------------------------------------------------------

    /// Acquire, returning a guard that releases on drop.
    ///
    /// A denied acquisition becomes [`TaskboardError::TaskLocked`].
    pub fn lock(&self, dir: &Path, tool: &str) -> Result<LockGuard> {
        let acquisition = self.acquire(dir, tool)?;
        match acquisition.lock_id {
            Some(lock_id) if acquisition.acquired => Ok(LockGuard {
                manager: self.clone(),
                dir: dir.to_path_buf(),
                lock_id,
                released: false,
            }),
            _ => Err(TaskboardError::TaskLocked {
                reason: acquisition
                    .reason
                    .unwrap_or_else(|| "lock unavailable".to_string()),
            }),
        }
    }

    /// Run `op` while holding the lock on `dir`; the lock is released even
    /// when `op` fails.
    ///
    /// An error from `op` takes precedence over a release failure.
    pub fn with_lock<T, F>(&self, dir: &Path, tool: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let guard = self.lock(dir, tool)?;
        let outcome = op();
        let released = guard.release();
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(error = %release_err, "Lock release failed after operation error");
                Err(e)
            }
        }
    }

    /// Exclusive cross-process guard over lock bookkeeping for `dir`.
    fn guard(&self, dir: &Path) -> Result<File> {
        let guard = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(GUARD_FILE))
            .into_taskboard_lock()?;
        FileExt::lock_exclusive(&guard).map_err(|e| {
            TaskboardError::lock_failed(format!("Failed to acquire lock guard: {e}"))
        })?;
        Ok(guard)
    }
}

// ============================================================================
// Lock Guard
// ============================================================================

/// Holds a task lock until released or dropped.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    dir: PathBuf,
    lock_id: String,
    released: bool,
}

impl LockGuard {
    /// Ownership token of the held lock.
    #[must_use]
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Directory the lock protects.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Release now, surfacing failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        let outcome = self.manager.release(&self.dir, &self.lock_id)?;
        if outcome.released {
            Ok(())
        } else {
            Err(TaskboardError::lock_failed(
                outcome
                    .reason
                    .unwrap_or_else(|| "release refused".to_string()),
            ))
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.manager.release(&self.dir, &self.lock_id) {
            Ok(outcome) if outcome.released => {}
            Ok(outcome) => warn!(
                dir = %self.dir.display(),
                reason = ?outcome.reason,
                "Lock not released on drop"
            ),
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "Lock release on drop failed"),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TaskboardError::invalid_argument(
            field,
            "must not be empty or whitespace",
        ));
    }
    Ok(())
}

fn read_existing(path: &Path) -> Result<Existing> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(match LockRecord::parse(&content) {
            Some(record) => Existing::Record(record),
            None => Existing::Malformed,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Existing::Absent),
        // Binary garbage in the lock file counts as malformed
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Ok(Existing::Malformed),
        Err(e) => Err(TaskboardError::lock_failed(format!(
            "Failed to read lock file {}: {e}",
            path.display()
        ))),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TaskboardError::lock_failed(format!(
            "Failed to remove lock file {}: {e}",
            path.display()
        ))),
    }
}

fn write_record(dir: &Path, path: &Path, record: &LockRecord) -> Result<()> {
    let tmp = dir.join(format!("{LOCK_FILE}.{}.tmp", record.lock_id));
    let json = serde_json::to_string_pretty(record)?;

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    written.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        TaskboardError::lock_failed(format!("Failed to write lock file {}: {e}", path.display()))
    })
}
