//! Custom error types for taskboard.
//!
//! Every error carries a stable machine-readable [`ErrorCode`] so callers on
//! the other side of a protocol boundary can branch on the category instead
//! of parsing messages. Messages themselves always spell out the corrective
//! action.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Grammar shown to callers whenever a plan is rejected for its format.
pub const CHECKBOX_GRAMMAR: &str = "- [ ] **Title**: description  (use [ ] pending, [~] in progress, [x] complete)";

/// Stable error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TaskLocked,
    LockFailed,
    PlanFormatInvalid,
    StepCountMismatch,
    StepNotFound,
    DocumentCorrupted,
    VerificationFailed,
    ReconciliationRejected,
    TaskNotFound,
    TaskExists,
    TaskAlreadyTerminal,
    InvalidArgument,
    ConfigInvalid,
    IoError,
    Internal,
}

impl ErrorCode {
    /// The wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskLocked => "TASK_LOCKED",
            Self::LockFailed => "LOCK_FAILED",
            Self::PlanFormatInvalid => "PLAN_FORMAT_INVALID",
            Self::StepCountMismatch => "STEP_COUNT_MISMATCH",
            Self::StepNotFound => "STEP_NOT_FOUND",
            Self::DocumentCorrupted => "DOCUMENT_CORRUPTED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::ReconciliationRejected => "RECONCILIATION_REJECTED",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::TaskExists => "TASK_EXISTS",
            Self::TaskAlreadyTerminal => "TASK_ALREADY_TERMINAL",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::IoError => "IO_ERROR",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for taskboard operations
#[derive(Error, Debug)]
pub enum TaskboardError {
    // =========================================================================
    // Contention Errors
    // =========================================================================
    /// Another live holder owns the task lock
    #[error("Task is locked: {reason}. Retry once the current holder finishes or its lock goes stale.")]
    TaskLocked { reason: String },

    /// Lock bookkeeping failed (write, release, or ownership)
    #[error("Lock operation failed: {message}")]
    LockFailed { message: String },

    // =========================================================================
    // Format / Validation Errors
    // =========================================================================
    /// Plan text does not follow the checkbox grammar
    #[error("Invalid plan format: {message}. Expected checkbox lines like: {grammar}", grammar = CHECKBOX_GRAMMAR)]
    PlanFormatInvalid { message: String },

    /// Declared step count disagrees with the parsed plan
    #[error("Step count mismatch: expected {expected} steps but the plan contains {actual} checkbox items. Update the plan or the declared step count so they agree.")]
    StepCountMismatch { expected: i64, actual: i64 },

    /// A progress update or rewrite named a step that is not in the plan
    #[error("Step not found: {step} (plan has {total} checkbox items). Use a 1-based step number or an exact item title.")]
    StepNotFound { step: String, total: usize },

    /// Caller supplied an empty or unsafe argument
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    // =========================================================================
    // Corruption Errors
    // =========================================================================
    /// A document changed or became unreadable between read and write
    #[error("Document corrupted at {path}: {detail}. The write was aborted; inspect the file and resubmit.")]
    DocumentCorrupted { path: PathBuf, detail: String },

    // =========================================================================
    // Policy Rejections
    // =========================================================================
    /// Completion evidence too weak to accept a DONE claim
    #[error("Completion verification failed: agent work shows {confidence}% confidence (threshold {threshold}%). Missing evidence: {missing}. Use ERROR status if the task could not be completed, or provide more evidence (progress reports, file changes, test runs) before marking DONE.", missing = format_warnings(.warnings))]
    VerificationFailed {
        confidence: u8,
        threshold: u8,
        warnings: Vec<String>,
    },

    /// Strict reconciliation refused unchecked plan items
    #[error("Cannot mark task DONE: {count} unchecked items remain in the plan ({titles}). Check them off, choose reconciliation mode 'reconcile', 'auto_complete' or 'force', or use ERROR status.", titles = .titles.join(", "))]
    UncheckedItems { count: usize, titles: Vec<String> },

    // =========================================================================
    // Task Lifecycle Errors
    // =========================================================================
    /// Task directory does not exist
    #[error("Task not found: {agent}/{task_id}. Create it first.")]
    TaskNotFound { agent: String, task_id: String },

    /// Task directory already initialized
    #[error("Task already exists: {agent}/{task_id}. Choose a different task id.")]
    TaskExists { agent: String, task_id: String },

    /// Task already carries a terminal document
    #[error("Task {agent}/{task_id} is already {status}; terminal tasks cannot be modified. Create a new task instead.")]
    TaskTerminal {
        agent: String,
        task_id: String,
        status: String,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load or validate configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_warnings(warnings: &[String]) -> String {
    if warnings.is_empty() {
        "none recorded".to_string()
    } else {
        warnings.join("; ")
    }
}

impl TaskboardError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a lock failure
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::LockFailed {
            message: message.into(),
        }
    }

    /// Create a plan format error
    pub fn plan_format(message: impl Into<String>) -> Self {
        Self::PlanFormatInvalid {
            message: message.into(),
        }
    }

    /// Create a corruption error
    pub fn corrupted(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::DocumentCorrupted {
            path: path.into(),
            detail: detail.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Machine-readable category of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TaskLocked { .. } => ErrorCode::TaskLocked,
            Self::LockFailed { .. } => ErrorCode::LockFailed,
            Self::PlanFormatInvalid { .. } => ErrorCode::PlanFormatInvalid,
            Self::StepCountMismatch { .. } => ErrorCode::StepCountMismatch,
            Self::StepNotFound { .. } => ErrorCode::StepNotFound,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::DocumentCorrupted { .. } => ErrorCode::DocumentCorrupted,
            Self::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            Self::UncheckedItems { .. } => ErrorCode::ReconciliationRejected,
            Self::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Self::TaskExists { .. } => ErrorCode::TaskExists,
            Self::TaskTerminal { .. } => ErrorCode::TaskAlreadyTerminal,
            Self::Config { .. } => ErrorCode::ConfigInvalid,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) | Self::Other(_) => ErrorCode::Internal,
        }
    }

    /// Check if this error is recoverable by simply retrying later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TaskLocked { .. } | Self::LockFailed { .. })
    }

    /// Check if this error is an intentional policy rejection rather than a failure
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Self::VerificationFailed { .. } | Self::UncheckedItems { .. }
        )
    }

    /// Check if this error needs a human (or the calling agent) to intervene
    pub fn requires_intervention(&self) -> bool {
        matches!(
            self,
            Self::DocumentCorrupted { .. } | Self::TaskTerminal { .. } | Self::Config { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TaskLocked { .. } | Self::LockFailed { .. } => 2,
            Self::PlanFormatInvalid { .. }
            | Self::StepCountMismatch { .. }
            | Self::StepNotFound { .. }
            | Self::InvalidArgument { .. } => 3,
            Self::DocumentCorrupted { .. } => 4,
            Self::VerificationFailed { .. } | Self::UncheckedItems { .. } => 5,
            Self::TaskNotFound { .. } | Self::TaskExists { .. } | Self::TaskTerminal { .. } => 6,
            Self::Config { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for taskboard results
pub type Result<T> = std::result::Result<T, TaskboardError>;

/// Extension trait for converting anyhow errors to TaskboardError
pub trait IntoTaskboardError<T> {
    fn into_taskboard_config(self) -> Result<T>;
    fn into_taskboard_lock(self) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoTaskboardError<T> for std::result::Result<T, E> {
    fn into_taskboard_config(self) -> Result<T> {
        self.map_err(|e| TaskboardError::config(format!("{:#}", e.into())))
    }

    fn into_taskboard_lock(self) -> Result<T> {
        self.map_err(|e| TaskboardError::lock_failed(format!("{:#}", e.into())))
    }
}
