//! Task directories and their lifecycle.
//!
//! A task lives at `<comm_root>/<agent>/<task_id>/`. Its lifecycle is never
//! stored; it is derived from which of the four lifecycle documents exist,
//! once per read, through [`derive_status`].

pub mod cache;
pub mod complete;
pub mod document;
pub mod progress;
pub mod store;
pub mod todos;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use cache::{AgentCache, DEFAULT_AGENT_CACHE_TTL_SECS};
pub use complete::{CompletionOutcome, CompletionRequest, CompletionStatus};
pub use document::{write_verified, Document};
pub use progress::{ProgressReceipt, ProgressRecord, ProgressStatus, ProgressUpdate};
pub use store::{PlanSubmission, TaskSnapshot, TaskStore, TaskSummary};
pub use todos::{apply_todos, SyncReport, TodoItem, TodoMatch, TodoStatus, UnmatchedTodo};

use crate::error::{Result, TaskboardError};
use crate::plan::METADATA_FILE;

/// Creation record.
pub const INIT_FILE: &str = "INIT.md";
/// Checkbox plan.
pub const PLAN_FILE: &str = "PLAN.md";
/// Terminal success document.
pub const DONE_FILE: &str = "DONE.md";
/// Terminal failure document.
pub const ERROR_FILE: &str = "ERROR.md";
/// Append-only log of accepted progress reports.
pub const PROGRESS_FILE: &str = ".progress.jsonl";

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of a task, derived from document presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// No lifecycle documents at all.
    Missing,
    /// INIT only.
    Initialized,
    /// A plan exists and the task is not terminal.
    InProgress,
    /// DONE exists.
    Completed,
    /// ERROR exists.
    Failed,
    /// Both DONE and ERROR exist. Never produced by this crate.
    Conflicted,
}

impl TaskStatus {
    /// Whether the task accepts no further writes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Conflicted)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Initialized => "initialized",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Conflicted => "conflicted",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the lifecycle state from which documents exist.
#[must_use]
pub const fn derive_status(has_init: bool, has_plan: bool, has_done: bool, has_error: bool) -> TaskStatus {
    match (has_done, has_error) {
        (true, true) => TaskStatus::Conflicted,
        (true, false) => TaskStatus::Completed,
        (false, true) => TaskStatus::Failed,
        (false, false) if has_plan => TaskStatus::InProgress,
        (false, false) if has_init => TaskStatus::Initialized,
        (false, false) => TaskStatus::Missing,
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Resolved location of one task directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPaths {
    agent: String,
    task_id: String,
    dir: PathBuf,
}

impl TaskPaths {
    /// Resolve `(agent, task_id)` beneath `comm_root`.
    ///
    /// Both identifiers must be single, non-empty path components.
    pub fn new(comm_root: &Path, agent: &str, task_id: &str) -> Result<Self> {
        validate_component("agent", agent)?;
        validate_component("task_id", task_id)?;
        Ok(Self {
            agent: agent.to_string(),
            task_id: task_id.to_string(),
            dir: comm_root.join(agent).join(task_id),
        })
    }

    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn init_path(&self) -> PathBuf {
        self.dir.join(INIT_FILE)
    }

    #[must_use]
    pub fn plan_path(&self) -> PathBuf {
        self.dir.join(PLAN_FILE)
    }

    #[must_use]
    pub fn done_path(&self) -> PathBuf {
        self.dir.join(DONE_FILE)
    }

    #[must_use]
    pub fn error_path(&self) -> PathBuf {
        self.dir.join(ERROR_FILE)
    }

    #[must_use]
    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Current lifecycle state, read from the filesystem.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        derive_status(
            self.init_path().is_file(),
            self.plan_path().is_file(),
            self.done_path().is_file(),
            self.error_path().is_file(),
        )
    }

    /// Fail with `TASK_NOT_FOUND` unless the task directory exists.
    pub fn require_exists(&self) -> Result<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(TaskboardError::TaskNotFound {
                agent: self.agent.clone(),
                task_id: self.task_id.clone(),
            })
        }
    }

    /// Fail with `TASK_ALREADY_TERMINAL` when DONE or ERROR exists.
    pub fn require_writable(&self) -> Result<TaskStatus> {
        let status = self.status();
        if status.is_terminal() {
            return Err(TaskboardError::TaskTerminal {
                agent: self.agent.clone(),
                task_id: self.task_id.clone(),
                status: status.to_string(),
            });
        }
        Ok(status)
    }
}

impl fmt::Display for TaskPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent, self.task_id)
    }
}

fn validate_component(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TaskboardError::invalid_argument(
            field,
            "must not be empty or whitespace",
        ));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(TaskboardError::invalid_argument(
            field,
            format!("'{value}' must be a single path component"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    #[test]
    fn test_derive_status_table() {
        assert_eq!(derive_status(false, false, false, false), TaskStatus::Missing);
        assert_eq!(derive_status(true, false, false, false), TaskStatus::Initialized);
        assert_eq!(derive_status(true, true, false, false), TaskStatus::InProgress);
        assert_eq!(derive_status(false, true, false, false), TaskStatus::InProgress);
        assert_eq!(derive_status(true, true, true, false), TaskStatus::Completed);
        assert_eq!(derive_status(true, false, false, true), TaskStatus::Failed);
        assert_eq!(derive_status(true, true, true, true), TaskStatus::Conflicted);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Conflicted.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Initialized.is_terminal());
    }

    #[test]
    fn test_paths_layout() {
        let paths = TaskPaths::new(Path::new("/comm"), "backend", "task-1").unwrap();
        assert_eq!(paths.dir(), Path::new("/comm/backend/task-1"));
        assert_eq!(paths.plan_path(), Path::new("/comm/backend/task-1/PLAN.md"));
        assert_eq!(
            paths.metadata_path(),
            Path::new("/comm/backend/task-1/PLAN.metadata.json")
        );
        assert_eq!(paths.to_string(), "backend/task-1");
    }

    #[test]
    fn test_paths_reject_traversal_and_blanks() {
        for bad in ["", "  ", "..", ".", "a/b", "a\\b"] {
            let err = TaskPaths::new(Path::new("/comm"), bad, "t").unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidArgument, "agent {bad:?}");
            let err = TaskPaths::new(Path::new("/comm"), "a", bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidArgument, "task {bad:?}");
        }
    }

    #[test]
    fn test_status_reads_filesystem() {
        let temp = TempDir::new().unwrap();
        let paths = TaskPaths::new(temp.path(), "agent", "t1").unwrap();
        assert_eq!(paths.status(), TaskStatus::Missing);
        assert_eq!(
            paths.require_exists().unwrap_err().code(),
            ErrorCode::TaskNotFound
        );

        std::fs::create_dir_all(paths.dir()).unwrap();
        std::fs::write(paths.init_path(), "init").unwrap();
        assert_eq!(paths.status(), TaskStatus::Initialized);

        std::fs::write(paths.error_path(), "failed").unwrap();
        let err = paths.require_writable().unwrap_err();
        assert_eq!(err.code(), ErrorCode::TaskAlreadyTerminal);
        assert!(err.to_string().contains("failed"));
    }
}
