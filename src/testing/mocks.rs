//! Test doubles for the completion flow.
//!
//! These let tests drive [`TaskStore::complete`] at an exact confidence
//! without arranging files and timestamps in a real workspace.
//!
//! [`TaskStore::complete`]: crate::task::TaskStore::complete

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, TaskboardError};
use crate::task::TaskPaths;
use crate::verify::{Evidence, VerificationReport, WorkVerifier, DEFAULT_CONFIDENCE_THRESHOLD};

/// Verifier that always reports the same confidence.
///
/// # Example
///
/// ```
/// use taskboard::testing::FixedVerifier;
///
/// let verifier = FixedVerifier::new(69)
///     .with_warning("No test execution detected");
/// assert_eq!(verifier.call_count(), 0);
/// ```
#[derive(Debug)]
pub struct FixedVerifier {
    confidence: u8,
    threshold: u8,
    warnings: Vec<String>,
    error: Option<String>,
    call_count: AtomicU32,
}

impl Clone for FixedVerifier {
    fn clone(&self) -> Self {
        Self {
            confidence: self.confidence,
            threshold: self.threshold,
            warnings: self.warnings.clone(),
            error: self.error.clone(),
            call_count: AtomicU32::new(self.call_count.load(Ordering::SeqCst)),
        }
    }
}

impl Default for FixedVerifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FixedVerifier {
    /// Create a verifier reporting `confidence`.
    #[must_use]
    pub fn new(confidence: u8) -> Self {
        Self {
            confidence,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            warnings: Vec::new(),
            error: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Add a warning to every report.
    #[must_use]
    pub fn with_warning(mut self, warning: &str) -> Self {
        self.warnings.push(warning.to_string());
        self
    }

    /// Threshold recorded in reports.
    #[must_use]
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Make every call fail.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Number of times `verify` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl WorkVerifier for FixedVerifier {
    fn verify(&self, _task: &TaskPaths) -> Result<VerificationReport> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            return Err(TaskboardError::Other(anyhow::anyhow!("{error}")));
        }
        Ok(VerificationReport::with_confidence(
            Evidence::default(),
            self.confidence,
            self.warnings.clone(),
            self.threshold,
        ))
    }
}
