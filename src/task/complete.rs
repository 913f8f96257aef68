//! Completion requests, outcomes and the terminal documents they produce.
//!
//! The decision flow itself lives in [`TaskStore::complete`]; this module
//! holds the boundary types and renders DONE.md / ERROR.md.
//!
//! [`TaskStore::complete`]: super::TaskStore::complete

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TaskboardError};
use crate::reconcile::{ReconciliationMode, ReconciliationOutcome};
use crate::verify::VerificationReport;

/// Terminal status a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompletionStatus {
    Done,
    Error,
}

impl CompletionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionStatus {
    type Err = TaskboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "DONE" => Ok(Self::Done),
            "ERROR" => Ok(Self::Error),
            other => Err(TaskboardError::invalid_argument(
                "status",
                format!("unknown completion status '{other}' (use DONE or ERROR)"),
            )),
        }
    }
}

/// A request to close a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub agent: String,
    pub task_id: String,
    pub status: CompletionStatus,
    pub summary: String,
    /// Mode name; `None` uses the store's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation_mode: Option<String>,
    /// Explanations for unchecked items, keyed by exact title.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reconciliation_explanations: HashMap<String, String>,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(
        agent: impl Into<String>,
        task_id: impl Into<String>,
        status: CompletionStatus,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            task_id: task_id.into(),
            status,
            summary: summary.into(),
            reconciliation_mode: None,
            reconciliation_explanations: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.reconciliation_mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn with_explanation(mut self, title: impl Into<String>, explanation: impl Into<String>) -> Self {
        self.reconciliation_explanations
            .insert(title.into(), explanation.into());
        self
    }

    /// Resolve the requested mode against a default.
    #[must_use]
    pub fn mode_or(&self, default: ReconciliationMode) -> ReconciliationMode {
        self.reconciliation_mode
            .as_deref()
            .map_or(default, ReconciliationMode::parse)
    }

    pub fn validate(&self) -> Result<()> {
        if self.summary.trim().is_empty() {
            return Err(TaskboardError::invalid_argument(
                "summary",
                "describe what was done (or what failed) before closing the task",
            ));
        }
        Ok(())
    }
}

/// Result handed back for an accepted completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub success: bool,
    pub status: CompletionStatus,
    pub summary: String,
    pub completed_at: DateTime<Utc>,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

/// Fold the caller's summary and the reconciliation report together.
///
/// A forced completion leads with its warning so it cannot be missed.
#[must_use]
pub fn compose_summary(summary: &str, reconciliation: Option<&ReconciliationOutcome>) -> String {
    let summary = summary.trim();
    match reconciliation {
        None => summary.to_string(),
        Some(outcome) if outcome.mode == ReconciliationMode::Force && !outcome.forced_unchecked.is_empty() => {
            format!("{}\n\n{summary}", outcome.report)
        }
        Some(outcome) => format!("{summary}\n\n{}", outcome.report),
    }
}

/// Body of DONE.md.
#[must_use]
pub fn render_done(
    request: &CompletionRequest,
    summary: &str,
    verification: &VerificationReport,
    completed_at: DateTime<Utc>,
) -> String {
    let mut body = format!(
        "# DONE: {}\n\n**Agent**: {}\n**Completed**: {}\n**Verification confidence**: {}% (threshold {}%)\n\n## Summary\n\n{summary}\n",
        request.task_id,
        request.agent,
        completed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        verification.confidence,
        verification.threshold,
    );
    if !verification.warnings.is_empty() {
        body.push_str("\n## Verification warnings\n\n");
        for warning in &verification.warnings {
            body.push_str(&format!("- {warning}\n"));
        }
    }
    body
}

/// Body of ERROR.md.
#[must_use]
pub fn render_error(request: &CompletionRequest, completed_at: DateTime<Utc>) -> String {
    format!(
        "# ERROR: {}\n\n**Agent**: {}\n**Failed**: {}\n\n## Details\n\n{}\n",
        request.task_id,
        request.agent,
        completed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        request.summary.trim(),
    )
}
