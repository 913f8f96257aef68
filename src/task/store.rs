//! The task store: every mutator and reader over the comm root.
//!
//! Mutators follow one pattern: resolve the task, take its lock, re-read
//! the documents they depend on, write through the verified writer, release
//! the lock (also on error). Readers never lock.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::cache::AgentCache;
use super::complete::{self, CompletionOutcome, CompletionRequest, CompletionStatus};
use super::document::{write_verified, Document};
use super::progress::{self, ProgressReceipt, ProgressRecord, ProgressUpdate};
use super::todos::{apply_todos, SyncReport, TodoItem};
use super::{TaskPaths, TaskStatus};
use crate::config::TaskboardConfig;
use crate::error::{Result, TaskboardError};
use crate::lock::{LockManager, LockStatus};
use crate::plan::{
    complete_all, parse_checkboxes, set_status_at, validate_plan, validate_step_count,
    CheckboxItem, PlanMetadata,
};
use crate::reconcile::{reconcile, ReconciliationMode};
use crate::verify::{AgentWorkVerifier, VerificationReport, WorkVerifier, DEFAULT_CONFIDENCE_THRESHOLD};

// ============================================================================
// Result types
// ============================================================================

/// Outcome of a plan submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSubmission {
    pub step_count: i64,
    pub replaced_existing: bool,
    pub warnings: Vec<String>,
}

/// Point-in-time view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub agent: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub items: Vec<CheckboxItem>,
    pub completed_steps: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_steps: Option<i64>,
    pub progress_reports: usize,
    pub lock: LockStatus,
    pub warnings: Vec<String>,
}

/// One row of a task listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub agent: String,
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

// ============================================================================
// Store
// ============================================================================

/// Task operations over a comm root.
pub struct TaskStore {
    comm_root: PathBuf,
    locks: LockManager,
    verifier: Arc<dyn WorkVerifier>,
    agents: Arc<AgentCache>,
    confidence_threshold: u8,
    default_mode: ReconciliationMode,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("comm_root", &self.comm_root)
            .field("locks", &self.locks)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("default_mode", &self.default_mode)
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    /// Store with default settings, verifying work found under `workspace`.
    pub fn new(comm_root: impl Into<PathBuf>, workspace: impl AsRef<Path>) -> Self {
        let comm_root = comm_root.into();
        let verifier = AgentWorkVerifier::new(workspace, &comm_root, DEFAULT_CONFIDENCE_THRESHOLD);
        Self {
            comm_root,
            locks: LockManager::default(),
            verifier: Arc::new(verifier),
            agents: Arc::new(AgentCache::default()),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            default_mode: ReconciliationMode::default(),
        }
    }

    /// Store configured from a validated [`TaskboardConfig`].
    pub fn from_config(config: &TaskboardConfig) -> Result<Self> {
        config.validate()?;
        let verifier = AgentWorkVerifier::new(
            config.workspace(),
            &config.comm_dir,
            config.confidence_threshold,
        );
        Ok(Self {
            comm_root: config.comm_dir.clone(),
            locks: LockManager::new(config.lock_timeout()),
            verifier: Arc::new(verifier),
            agents: Arc::new(AgentCache::new(config.agent_cache_ttl())),
            confidence_threshold: config.confidence_threshold,
            default_mode: config.reconciliation_mode(),
        })
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn WorkVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn with_agent_cache(mut self, agents: Arc<AgentCache>) -> Self {
        self.agents = agents;
        self
    }

    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: u8) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_default_mode(mut self, mode: ReconciliationMode) -> Self {
        self.default_mode = mode;
        self
    }

    #[must_use]
    pub fn comm_root(&self) -> &Path {
        &self.comm_root
    }

    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    #[must_use]
    pub fn agent_cache(&self) -> &AgentCache {
        &self.agents
    }

    /// Resolve a task's paths.
    pub fn paths(&self, agent: &str, task_id: &str) -> Result<TaskPaths> {
        TaskPaths::new(&self.comm_root, agent, task_id)
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    /// Create a task directory and its INIT.md.
    pub fn create(&self, agent: &str, task_id: &str, description: &str) -> Result<TaskPaths> {
        let paths = self.paths(agent, task_id)?;
        fs::create_dir_all(paths.dir())?;

        self.locks.with_lock(paths.dir(), "create-task", || {
            if paths.status() != TaskStatus::Missing {
                return Err(TaskboardError::TaskExists {
                    agent: agent.to_string(),
                    task_id: task_id.to_string(),
                });
            }
            write_verified(&paths.init_path(), None, &render_init(&paths, description))
        })?;

        self.agents.clear();
        info!(task = %paths, "Task created");
        Ok(paths)
    }

    /// Submit (or replace) the plan of a non-terminal task.
    ///
    /// `step_count`, when given, must equal the number of checkbox items.
    /// Without it, a count declared by an earlier submission still applies.
    pub fn write_plan(
        &self,
        agent: &str,
        task_id: &str,
        plan: &str,
        step_count: Option<i64>,
    ) -> Result<PlanSubmission> {
        let paths = self.paths(agent, task_id)?;
        paths.require_exists()?;
        let parsed = validate_plan(plan)?;
        let actual = parsed.len() as i64;

        self.locks.with_lock(paths.dir(), "write-plan", || {
            paths.require_writable()?;

            let declared = match step_count {
                Some(n) => Some(n),
                None => PlanMetadata::load(paths.dir())?.map(|m| m.step_count),
            };
            if let Some(expected) = declared {
                if !validate_step_count(expected, actual) {
                    return Err(TaskboardError::StepCountMismatch { expected, actual });
                }
            }

            let existing = Document::read(&paths.plan_path())?;
            write_verified(
                &paths.plan_path(),
                existing.as_ref().map(|d| d.digest.as_str()),
                plan,
            )?;

            let metadata = PlanMetadata::new(actual, agent, Some(task_id.to_string()));
            write_verified(&paths.metadata_path(), None, &metadata.to_json()?)?;

            info!(task = %paths, steps = actual, malformed = parsed.malformed.len(), "Plan written");
            Ok(PlanSubmission {
                step_count: actual,
                replaced_existing: existing.is_some(),
                warnings: parsed.warnings(),
            })
        })
    }

    /// Apply a step-level progress report.
    pub fn report_progress(
        &self,
        agent: &str,
        task_id: &str,
        update: &ProgressUpdate,
    ) -> Result<ProgressReceipt> {
        update.validate()?;
        let paths = self.paths(agent, task_id)?;
        paths.require_exists()?;

        self.locks.with_lock(paths.dir(), "report-progress", || {
            paths.require_writable()?;
            let doc = read_plan(&paths)?;
            let parsed = parse_checkboxes(&doc.text);

            let Some(item) = parsed.items.get(update.step - 1) else {
                return Err(TaskboardError::StepNotFound {
                    step: update.step.to_string(),
                    total: parsed.len(),
                });
            };
            let title = item.title.clone();
            let checkbox = update.status.checkbox();

            let text = set_status_at(&doc.text, update.step - 1, checkbox)?;
            if text != doc.text {
                write_verified(&paths.plan_path(), Some(&doc.digest), &text)?;
            }
            progress::append_record(&paths, &ProgressRecord::from_update(update, &title))?;

            if let Some(blocker) = &update.blocker {
                warn!(task = %paths, step = update.step, %blocker, "Step blocked");
            }
            debug!(task = %paths, step = update.step, status = update.status.as_str(), "Progress recorded");

            let updated = parse_checkboxes(&text);
            Ok(ProgressReceipt {
                step: update.step,
                title,
                checkbox,
                completed_steps: updated.checked_count(),
                total_steps: updated.len(),
                blocker: update.blocker.clone(),
            })
        })
    }

    /// Sync an external todo list onto the plan via fuzzy matching.
    pub fn sync_todos(&self, agent: &str, task_id: &str, todos: &[TodoItem]) -> Result<SyncReport> {
        let paths = self.paths(agent, task_id)?;
        paths.require_exists()?;

        self.locks.with_lock(paths.dir(), "sync-todos", || {
            paths.require_writable()?;
            let doc = read_plan(&paths)?;
            let (text, report) = apply_todos(&doc.text, todos)?;
            if text != doc.text {
                write_verified(&paths.plan_path(), Some(&doc.digest), &text)?;
            }
            debug!(
                task = %paths,
                matched = report.matched.len(),
                changed = report.changed_count(),
                unmatched = report.unmatched.len(),
                "Todos synced"
            );
            Ok(report)
        })
    }

    /// Close a task as DONE or ERROR.
    ///
    /// ERROR is always accepted. DONE must first clear the work verifier,
    /// then the reconciliation mode decides what happens to unchecked plan
    /// items. A task without a plan, or whose plan has no items, skips
    /// reconciliation.
    pub fn complete(&self, request: &CompletionRequest) -> Result<CompletionOutcome> {
        request.validate()?;
        let paths = self.paths(&request.agent, &request.task_id)?;
        paths.require_exists()?;

        self.locks
            .with_lock(paths.dir(), "mark-complete", || self.complete_locked(&paths, request))
    }

    fn complete_locked(&self, paths: &TaskPaths, request: &CompletionRequest) -> Result<CompletionOutcome> {
        paths.require_writable()?;
        let completed_at = Utc::now();

        if request.status == CompletionStatus::Error {
            write_verified(
                &paths.error_path(),
                None,
                &complete::render_error(request, completed_at),
            )?;
            info!(task = %paths, "Task marked ERROR");
            return Ok(CompletionOutcome {
                success: true,
                status: CompletionStatus::Error,
                summary: request.summary.trim().to_string(),
                completed_at,
                is_error: true,
                recommendations: vec![
                    "Review ERROR.md and open a follow-up task once the cause is resolved".to_string(),
                ],
            });
        }

        let verification = self.verifier.verify(paths)?;
        if verification.confidence < self.confidence_threshold {
            info!(
                task = %paths,
                confidence = verification.confidence,
                threshold = self.confidence_threshold,
                "DONE rejected by work verification"
            );
            return Err(TaskboardError::VerificationFailed {
                confidence: verification.confidence,
                threshold: self.confidence_threshold,
                warnings: verification.warnings,
            });
        }

        let plan = Document::read(&paths.plan_path())?;
        let parsed = plan
            .as_ref()
            .map(|doc| parse_checkboxes(&doc.text))
            .unwrap_or_default();

        let mut recommendations: Vec<String> = verification.warnings.clone();
        recommendations.extend(parsed.warnings());

        let reconciliation = match &plan {
            Some(doc) if !parsed.is_empty() => {
                let mode = request.mode_or(self.default_mode);
                let outcome = reconcile(&parsed.items, mode, &request.reconciliation_explanations)?;
                if outcome.rewrites_plan() {
                    // Every unchecked item is either auto-completed or reconciled
                    let (text, titles) = complete_all(&doc.text);
                    write_verified(&paths.plan_path(), Some(&doc.digest), &text)?;
                    debug!(task = %paths, mode = %mode, count = titles.len(), "Plan items checked off");
                }
                if !outcome.forced_unchecked.is_empty() {
                    recommendations.push(format!(
                        "Follow up on {} plan item(s) left unchecked by forced completion",
                        outcome.forced_unchecked.len()
                    ));
                }
                debug!(task = %paths, mode = %mode, "Reconciliation applied");
                Some(outcome)
            }
            _ => {
                debug!(task = %paths, "No plan items, reconciliation bypassed");
                None
            }
        };

        let summary = complete::compose_summary(&request.summary, reconciliation.as_ref());
        write_verified(
            &paths.done_path(),
            None,
            &complete::render_done(request, &summary, &verification, completed_at),
        )?;
        info!(task = %paths, confidence = verification.confidence, "Task marked DONE");

        Ok(CompletionOutcome {
            success: true,
            status: CompletionStatus::Done,
            summary,
            completed_at,
            is_error: false,
            recommendations,
        })
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    /// Read-only view of a task.
    pub fn snapshot(&self, agent: &str, task_id: &str) -> Result<TaskSnapshot> {
        let paths = self.paths(agent, task_id)?;
        paths.require_exists()?;

        let parsed = Document::read(&paths.plan_path())?
            .map(|doc| parse_checkboxes(&doc.text))
            .unwrap_or_default();

        Ok(TaskSnapshot {
            agent: agent.to_string(),
            task_id: task_id.to_string(),
            status: paths.status(),
            completed_steps: parsed.checked_count(),
            total_steps: parsed.len(),
            declared_steps: PlanMetadata::load(paths.dir())?.map(|m| m.step_count),
            progress_reports: progress::read_records(&paths)?.len(),
            lock: self.locks.check_lock(paths.dir())?,
            warnings: parsed.warnings(),
            items: parsed.items,
        })
    }

    /// Agents with a directory under the comm root, sorted. Cached.
    pub fn list_agents(&self) -> Result<Vec<String>> {
        self.agents.get_or_load(|| scan_agents(&self.comm_root))
    }

    /// Tasks of one agent or of every agent, sorted by agent then id.
    pub fn list(&self, agent: Option<&str>) -> Result<Vec<TaskSummary>> {
        let agents = match agent {
            Some(name) => {
                if !self.agents.contains(name, || scan_agents(&self.comm_root))? {
                    return Ok(Vec::new());
                }
                vec![name.to_string()]
            }
            None => self.list_agents()?,
        };

        let mut tasks = Vec::new();
        for agent in agents {
            let agent_dir = self.comm_root.join(&agent);
            for entry in WalkDir::new(&agent_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_dir() && !is_hidden(e.file_name()))
            {
                let task_id = entry.file_name().to_string_lossy().into_owned();
                let Ok(paths) = self.paths(&agent, &task_id) else {
                    continue;
                };
                tasks.push(TaskSummary {
                    status: paths.status(),
                    modified: last_modified(&paths).map(DateTime::<Utc>::from),
                    agent: agent.clone(),
                    task_id,
                });
            }
        }
        Ok(tasks)
    }

    /// Verify one task without completing it.
    pub fn verify(&self, agent: &str, task_id: &str) -> Result<VerificationReport> {
        let paths = self.paths(agent, task_id)?;
        paths.require_exists()?;
        self.verifier.verify(&paths)
    }

    /// Verify the agent's most recently touched non-terminal task.
    pub fn verify_agent(&self, agent: &str) -> Result<VerificationReport> {
        let latest = self
            .list(Some(agent))?
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .max_by_key(|t| t.modified)
            .ok_or_else(|| TaskboardError::TaskNotFound {
                agent: agent.to_string(),
                task_id: "(no active task)".to_string(),
            })?;
        self.verify(agent, &latest.task_id)
    }

    /// Lock state of one task.
    pub fn check_lock(&self, agent: &str, task_id: &str) -> Result<LockStatus> {
        let paths = self.paths(agent, task_id)?;
        paths.require_exists()?;
        self.locks.check_lock(paths.dir())
    }

    /// Remove stale locks from one task, or from every task when `task` is
    /// `None`.
    pub fn cleanup_locks(&self, task: Option<(&str, &str)>) -> Result<Vec<PathBuf>> {
        let dirs: Vec<PathBuf> = match task {
            Some((agent, task_id)) => {
                let paths = self.paths(agent, task_id)?;
                paths.require_exists()?;
                vec![paths.dir().to_path_buf()]
            }
            None => self
                .list(None)?
                .into_iter()
                .filter_map(|t| self.paths(&t.agent, &t.task_id).ok())
                .map(|p| p.dir().to_path_buf())
                .collect(),
        };

        let mut removed = Vec::new();
        for dir in dirs {
            match self.locks.cleanup_stale_locks(&dir) {
                Ok(mut paths) => removed.append(&mut paths),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Lock cleanup failed"),
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn read_plan(paths: &TaskPaths) -> Result<Document> {
    Document::read(&paths.plan_path())?.ok_or_else(|| {
        TaskboardError::plan_format(format!(
            "task {paths} has no PLAN.md yet; submit a plan before reporting progress"
        ))
    })
}

fn render_init(paths: &TaskPaths, description: &str) -> String {
    let mut body = format!(
        "# Task: {}\n\n**Agent**: {}\n**Created**: {}\n",
        paths.task_id(),
        paths.agent(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    let description = description.trim();
    if !description.is_empty() {
        body.push_str("\n## Description\n\n");
        body.push_str(description);
        body.push('\n');
    }
    body
}

fn scan_agents(comm_root: &Path) -> Result<Vec<String>> {
    if !comm_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut agents: Vec<String> = WalkDir::new(comm_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && !is_hidden(e.file_name()))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    agents.sort();
    Ok(agents)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Latest mtime among the task directory and its lifecycle documents.
fn last_modified(paths: &TaskPaths) -> Option<SystemTime> {
    [
        paths.dir().to_path_buf(),
        paths.init_path(),
        paths.plan_path(),
        paths.progress_path(),
    ]
    .iter()
    .filter_map(|p| fs::metadata(p).and_then(|m| m.modified()).ok())
    .max()
}
