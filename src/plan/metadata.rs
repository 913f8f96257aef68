//! Plan metadata sidecar (`PLAN.metadata.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

/// File name of the metadata sidecar inside a task directory.
pub const METADATA_FILE: &str = "PLAN.metadata.json";

/// Identifier of the checkbox grammar recorded in the sidecar.
pub const CHECKBOX_PATTERN: &str = "markdown-checkbox";

/// Version of the sidecar format.
pub const METADATA_VERSION: &str = "2.0.0";

/// Declared shape of a submitted plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    pub step_count: i64,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub checkbox_pattern: String,
    pub version: String,
}

impl PlanMetadata {
    /// Create metadata for a freshly submitted plan.
    #[must_use]
    pub fn new(step_count: i64, agent: impl Into<String>, task_id: Option<String>) -> Self {
        Self {
            step_count,
            agent: agent.into(),
            task_id,
            created_at: Utc::now(),
            checkbox_pattern: CHECKBOX_PATTERN.to_string(),
            version: METADATA_VERSION.to_string(),
        }
    }

    /// Path of the sidecar for a task directory.
    #[must_use]
    pub fn path(task_dir: &Path) -> PathBuf {
        task_dir.join(METADATA_FILE)
    }

    /// Load the sidecar; `None` when it is missing or unreadable.
    ///
    /// An unparsable sidecar is treated as absent (and logged) so a damaged
    /// metadata file never blocks plan submission.
    pub fn load(task_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(task_dir);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unparsable plan metadata");
                Ok(None)
            }
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
