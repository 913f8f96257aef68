//! Step-level progress reports.
//!
//! An accepted report flips one checkbox in the plan and appends a record to
//! the task's `.progress.jsonl`. The log is what the work verifier counts as
//! "progress reports filed".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::str::FromStr;
use tracing::warn;

use super::TaskPaths;
use crate::error::{Result, TaskboardError};
use crate::plan::CheckboxStatus;

/// Status a progress reporter may claim for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl ProgressStatus {
    /// Checkbox state the report maps to. A blocked step stays pending.
    #[must_use]
    pub const fn checkbox(self) -> CheckboxStatus {
        match self {
            Self::Pending | Self::Blocked => CheckboxStatus::Pending,
            Self::InProgress => CheckboxStatus::InProgress,
            Self::Completed => CheckboxStatus::Complete,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }
}

impl FromStr for ProgressStatus {
    type Err = TaskboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            other => Err(TaskboardError::invalid_argument(
                "status",
                format!("unknown progress status '{other}' (use pending, in_progress, completed or blocked)"),
            )),
        }
    }
}

/// A progress report for one plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// 1-based step number.
    pub step: usize,
    pub status: ProgressStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
}

impl ProgressUpdate {
    /// Reject impossible updates before any lock is taken.
    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(TaskboardError::invalid_argument(
                "step",
                "steps are numbered from 1",
            ));
        }
        if self.status == ProgressStatus::Blocked
            && self.blocker.as_deref().is_none_or(|b| b.trim().is_empty())
        {
            return Err(TaskboardError::invalid_argument(
                "blocker",
                "a blocked step must say what blocks it",
            ));
        }
        Ok(())
    }
}

/// One line of `.progress.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub step: usize,
    pub title: String,
    pub status: ProgressStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    pub reported_at: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_update(update: &ProgressUpdate, title: impl Into<String>) -> Self {
        Self {
            step: update.step,
            title: title.into(),
            status: update.status,
            description: update.description.clone(),
            blocker: update.blocker.clone(),
            reported_at: Utc::now(),
        }
    }
}

/// What a progress report changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReceipt {
    pub step: usize,
    pub title: String,
    pub checkbox: CheckboxStatus,
    pub completed_steps: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
}

/// Append a record to the task's progress log.
pub fn append_record(task: &TaskPaths, record: &ProgressRecord) -> Result<()> {
    let line = serde_json::to_string(record)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(task.progress_path())?;
    writeln!(file, "{line}")?;
    file.sync_all()?;
    Ok(())
}

/// Read every parsable record; unparsable lines are skipped with a warning.
pub fn read_records(task: &TaskPaths) -> Result<Vec<ProgressRecord>> {
    let path = task.progress_path();
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping unparsable progress record"
            ),
        }
    }
    Ok(records)
}
