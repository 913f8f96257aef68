//! Test fixtures for task directories.
//!
//! Provides a throwaway comm root with a store wired to a fixed verifier.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use super::mocks::FixedVerifier;
use crate::task::{TaskPaths, TaskStore};

/// A temporary comm root plus a store over it.
///
/// Automatically cleans up when dropped.
pub struct TaskFixture {
    temp_dir: TempDir,
    store: TaskStore,
    verifier: Arc<FixedVerifier>,
}

impl TaskFixture {
    /// Empty comm root; the verifier reports `confidence`.
    ///
    /// # Panics
    ///
    /// Panics if temporary directory creation fails.
    #[must_use]
    pub fn new(confidence: u8) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let verifier = Arc::new(FixedVerifier::new(confidence));
        let store = TaskStore::new(temp_dir.path().join("comm"), temp_dir.path())
            .with_verifier(verifier.clone());
        Self {
            temp_dir,
            store,
            verifier,
        }
    }

    /// A created task `backend/task-1` carrying `plan`.
    ///
    /// # Panics
    ///
    /// Panics if the task or plan cannot be written.
    #[must_use]
    pub fn with_plan(confidence: u8, plan: &str) -> Self {
        let fixture = Self::new(confidence);
        fixture
            .store
            .create("backend", "task-1", "fixture task")
            .expect("Failed to create task");
        fixture
            .store
            .write_plan("backend", "task-1", plan, None)
            .expect("Failed to write plan");
        fixture
    }

    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    #[must_use]
    pub fn verifier(&self) -> &FixedVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Paths of the `backend/task-1` task.
    ///
    /// # Panics
    ///
    /// Panics if the identifiers are rejected, which they never are.
    #[must_use]
    pub fn task(&self) -> TaskPaths {
        self.store
            .paths("backend", "task-1")
            .expect("fixture ids are valid")
    }

    /// Current PLAN.md text.
    ///
    /// # Panics
    ///
    /// Panics if the plan cannot be read.
    #[must_use]
    pub fn plan_text(&self) -> String {
        std::fs::read_to_string(self.task().plan_path()).expect("Failed to read PLAN.md")
    }
}
