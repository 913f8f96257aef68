//! taskboard - filesystem task coordination for autonomous agents
//!
//! Each unit of delegated work is a directory of plain documents whose
//! presence encodes lifecycle state. Several processes may touch the same
//! task at once, so every write goes through an advisory lock, plans are
//! re-read and verified before they are rewritten, and a DONE claim has to
//! clear a heuristic evidence check before it is accepted.
//!
//! # Architecture
//!
//! - [`plan`] - checkbox plan parsing, rewriting and the step-count sidecar
//! - [`lock`] - advisory sidecar locks with staleness detection
//! - [`matcher`] - fuzzy matching of todo text against plan titles
//! - [`verify`] - heuristic work verification
//! - [`reconcile`] - completion reconciliation modes
//! - [`task`] - task directories, the verified writer and the [`TaskStore`]
//! - [`config`] - TOML configuration
//! - [`error`] - error types with stable codes
//! - [`testing`] - test doubles
//!
//! # Example
//!
//! ```no_run
//! use taskboard::{CompletionRequest, CompletionStatus, TaskStore};
//!
//! let store = TaskStore::new("comm", ".");
//! store.create("backend", "task-1", "Add the /health endpoint")?;
//! store.write_plan(
//!     "backend",
//!     "task-1",
//!     "- [ ] **Route**: wire the handler\n- [ ] **Tests**: cover 200 and 503\n",
//!     Some(2),
//! )?;
//!
//! let request = CompletionRequest::new("backend", "task-1", CompletionStatus::Done, "Endpoint live")
//!     .with_mode("reconcile");
//! let outcome = store.complete(&request)?;
//! println!("{}", outcome.summary);
//! # Ok::<(), taskboard::TaskboardError>(())
//! ```

pub mod config;
pub mod error;
pub mod lock;
pub mod matcher;
pub mod plan;
pub mod reconcile;
pub mod task;
pub mod testing;
pub mod verify;

// Re-export commonly used types
pub use error::{ErrorCode, IntoTaskboardError, Result, TaskboardError};

pub use config::{ConfigSource, TaskboardConfig};
pub use lock::{LockGuard, LockManager, LockRecord, LockStatus};
pub use plan::{CheckboxItem, CheckboxStatus, ParsedPlan};
pub use reconcile::{ReconciliationMode, ReconciliationOutcome};
pub use task::{
    derive_status, AgentCache, CompletionOutcome, CompletionRequest, CompletionStatus,
    ProgressStatus, ProgressUpdate, TaskPaths, TaskStatus, TaskStore, TodoItem, TodoStatus,
};
pub use verify::{AgentWorkVerifier, Evidence, VerificationReport, WorkVerifier};
