//! Heuristic verification of claimed agent work.
//!
//! Before a DONE claim is accepted, the completion flow asks a
//! [`WorkVerifier`] how well the claim is corroborated by observable
//! signals:
//!
//! | Signal                         | Weight |
//! |--------------------------------|--------|
//! | plan document present          | 20     |
//! | progress reports filed         | 25     |
//! | files modified (3+ for full)   | 25     |
//! | test execution evidence        | 15     |
//! | elapsed time (5 min for full)  | 15     |
//!
//! No single missing signal is fatal; each one lowers the score and adds a
//! warning the caller can act on.
//!
//! # Limitations
//!
//! This is advisory evidence, not proof. File timestamps can be touched,
//! progress can be reported without work behind it, and a keyword in a
//! report is not a passing test run. The score tells you whether a claim
//! looks plausible, nothing more.
//!
//! # Example
//!
//! ```
//! use taskboard::verify::{score_evidence, Evidence};
//!
//! let evidence = Evidence {
//!     plan_exists: true,
//!     progress_reports: 2,
//!     files_modified: 3,
//!     ..Default::default()
//! };
//! let (confidence, warnings) = score_evidence(&evidence);
//! assert_eq!(confidence, 70);
//! assert_eq!(warnings.len(), 2);
//! ```

use ignore::WalkBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::error::Result;
use crate::plan::parse_checkboxes;
use crate::task::progress::read_records;
use crate::task::TaskPaths;

/// Confidence a DONE claim needs, inclusive.
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 70;

const PLAN_WEIGHT: u32 = 20;
const PROGRESS_WEIGHT: u32 = 25;
const FILES_WEIGHT: u32 = 25;
const TESTS_WEIGHT: u32 = 15;
const TIME_WEIGHT: u32 = 15;

/// Modified files needed for full file credit.
const FILES_FOR_FULL_CREDIT: usize = 3;

/// Working time needed for full time credit.
const SECS_FOR_FULL_CREDIT: u64 = 300;

/// Whole words that count as test evidence in titles and progress reports.
fn test_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(tests?|testing|tested|pytest|jest|specs?|coverage)\b")
            .expect("test keyword regex is valid")
    })
}

// ============================================================================
// Evidence and reports
// ============================================================================

/// Observable signals gathered for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub plan_exists: bool,
    pub progress_reports: usize,
    pub files_modified: usize,
    pub tests_run: bool,
    /// Whether the agent used the progress-reporting channel at all.
    pub mcp_progress: bool,
    pub time_spent_secs: u64,
}

/// Verdict of a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub success: bool,
    pub confidence: u8,
    pub threshold: u8,
    pub evidence: Evidence,
    pub warnings: Vec<String>,
    pub recommendation: String,
}

impl VerificationReport {
    /// Score `evidence` and judge it against `threshold`.
    #[must_use]
    pub fn from_evidence(evidence: Evidence, threshold: u8) -> Self {
        let (confidence, warnings) = score_evidence(&evidence);
        Self::with_confidence(evidence, confidence, warnings, threshold)
    }

    /// Build a report around an already-known confidence.
    #[must_use]
    pub fn with_confidence(
        evidence: Evidence,
        confidence: u8,
        warnings: Vec<String>,
        threshold: u8,
    ) -> Self {
        let success = confidence >= threshold;
        let recommendation = if success {
            "Evidence supports the completion claim.".to_string()
        } else {
            format!(
                "Confidence {confidence}% is below {threshold}%. Report progress, make and test the changes, or use ERROR status if the task could not be completed."
            )
        };
        Self {
            success,
            confidence,
            threshold,
            evidence,
            warnings,
            recommendation,
        }
    }
}

/// Reduce evidence to a confidence score in `0..=100` plus one warning per
/// missing or weak signal.
#[must_use]
pub fn score_evidence(evidence: &Evidence) -> (u8, Vec<String>) {
    let mut score = 0u32;
    let mut warnings = Vec::new();

    if evidence.plan_exists {
        score += PLAN_WEIGHT;
    } else {
        warnings.push("No plan document (PLAN.md) found".to_string());
    }

    if evidence.mcp_progress || evidence.progress_reports > 0 {
        score += PROGRESS_WEIGHT;
    } else {
        warnings.push("No progress reports filed".to_string());
    }

    let files = evidence.files_modified.min(FILES_FOR_FULL_CREDIT) as u32;
    score += FILES_WEIGHT * files / FILES_FOR_FULL_CREDIT as u32;
    if evidence.files_modified == 0 {
        warnings.push("No file modifications detected in the workspace".to_string());
    } else if evidence.files_modified < FILES_FOR_FULL_CREDIT {
        warnings.push(format!(
            "Only {} file(s) modified",
            evidence.files_modified
        ));
    }

    if evidence.tests_run {
        score += TESTS_WEIGHT;
    } else {
        warnings.push("No test execution detected".to_string());
    }

    let secs = evidence.time_spent_secs.min(SECS_FOR_FULL_CREDIT);
    score += (u64::from(TIME_WEIGHT) * secs / SECS_FOR_FULL_CREDIT) as u32;
    if evidence.time_spent_secs < SECS_FOR_FULL_CREDIT {
        warnings.push(format!(
            "Only {}s of work time since the task was created",
            evidence.time_spent_secs
        ));
    }

    (score.min(100) as u8, warnings)
}

// ============================================================================
// Verifier trait
// ============================================================================

/// Judges whether a task's DONE claim is corroborated.
///
/// The completion flow takes any implementation, so tests and alternative
/// evidence sources plug in without touching reconciliation.
pub trait WorkVerifier: Send + Sync {
    /// Verify the work behind `task`.
    fn verify(&self, task: &TaskPaths) -> Result<VerificationReport>;
}

// ============================================================================
// Filesystem verifier
// ============================================================================

/// Verifier that reads evidence from the task directory and the workspace.
#[derive(Debug, Clone)]
pub struct AgentWorkVerifier {
    workspace: PathBuf,
    comm_root: PathBuf,
    threshold: u8,
}

impl AgentWorkVerifier {
    /// `workspace` is scanned for modified files; `comm_root` is excluded
    /// from that scan so task documents never count as work.
    #[must_use]
    pub fn new(workspace: impl AsRef<Path>, comm_root: impl AsRef<Path>, threshold: u8) -> Self {
        Self {
            workspace: canonical(workspace.as_ref()),
            comm_root: canonical(comm_root.as_ref()),
            threshold,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Gather every signal for `task`.
    pub fn collect_evidence(&self, task: &TaskPaths) -> Result<Evidence> {
        let started = task_started(task);
        let records = read_records(task)?;

        let plan_exists = task.plan_path().is_file();
        let completed_test_item = if plan_exists {
            let plan = match fs::read_to_string(task.plan_path()) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(task = %task, error = %e, "Plan unreadable, no test evidence taken from it");
                    String::new()
                }
            };
            parse_checkboxes(&plan)
                .items
                .iter()
                .any(|item| item.status.is_complete() && mentions_tests(&item.title))
        } else {
            false
        };
        let reported_tests = records
            .iter()
            .any(|r| mentions_tests(&r.description) || mentions_tests(&r.title));

        let (files_modified, test_files_modified) = match started {
            Some(since) => self.scan_workspace(since),
            None => (0, 0),
        };

        let time_spent_secs = started
            .and_then(|since| SystemTime::now().duration_since(since).ok())
            .map_or(0, |d| d.as_secs());

        Ok(Evidence {
            plan_exists,
            progress_reports: records.len(),
            files_modified,
            tests_run: test_files_modified > 0 || reported_tests || completed_test_item,
            mcp_progress: !records.is_empty(),
            time_spent_secs,
        })
    }

    /// Count files modified at or after `since`, and how many of them look
    /// like tests. Honors `.gitignore` and skips the comm root.
    fn scan_workspace(&self, since: SystemTime) -> (usize, usize) {
        // The comm root may not have existed when the verifier was built
        let comm_root = canonical(&self.comm_root);
        let walker = WalkBuilder::new(&self.workspace)
            .require_git(false)
            .filter_entry(move |entry| !entry.path().starts_with(&comm_root))
            .build();

        let mut files = 0;
        let mut tests = 0;
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable workspace entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            if modified.is_some_and(|m| m >= since) {
                files += 1;
                if is_test_path(entry.path()) {
                    tests += 1;
                }
            }
        }
        (files, tests)
    }
}

impl WorkVerifier for AgentWorkVerifier {
    fn verify(&self, task: &TaskPaths) -> Result<VerificationReport> {
        let evidence = self.collect_evidence(task)?;
        let report = VerificationReport::from_evidence(evidence, self.threshold);
        if report.success {
            debug!(task = %task, confidence = report.confidence, "Work verified");
        } else {
            warn!(
                task = %task,
                confidence = report.confidence,
                threshold = self.threshold,
                missing = report.warnings.len(),
                "Work verification below threshold"
            );
        }
        Ok(report)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// When work on the task began: INIT.md's mtime, else the directory's.
fn task_started(task: &TaskPaths) -> Option<SystemTime> {
    fs::metadata(task.init_path())
        .or_else(|_| fs::metadata(task.dir()))
        .and_then(|m| m.modified())
        .ok()
}

fn mentions_tests(text: &str) -> bool {
    test_keyword_re().is_match(text)
}

fn is_test_path(path: &Path) -> bool {
    path.components().any(|c| {
        let part = c.as_os_str().to_string_lossy().to_lowercase();
        part == "tests" || part == "test" || part == "__tests__"
    }) || path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .is_some_and(|stem| {
            stem.starts_with("test_") || stem.ends_with("_test") || stem.ends_with(".test") || stem.ends_with(".spec")
        })
}
