//! End-to-end task lifecycle tests against the public library API.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use taskboard::lock::LOCK_FILE;
use taskboard::plan::CheckboxStatus;
use taskboard::task::TaskStore;
use taskboard::testing::FixedVerifier;
use taskboard::{
    CompletionRequest, CompletionStatus, ErrorCode, LockManager, LockRecord, ProgressStatus,
    ProgressUpdate, ReconciliationMode, TaskStatus, TodoItem, TodoStatus,
};

const PLAN: &str = "# Plan

- [x] **Setup Environment**: toolchain and CI
- [ ] **Write Documentation**: README and API docs
- [ ] **Performance Testing**: load test the endpoint
";

fn store(temp: &TempDir, confidence: u8) -> TaskStore {
    TaskStore::new(temp.path().join("comm"), temp.path())
        .with_verifier(Arc::new(FixedVerifier::new(confidence)))
}

fn planned(temp: &TempDir, confidence: u8) -> TaskStore {
    let store = store(temp, confidence);
    store.create("backend", "task-1", "Ship the endpoint").unwrap();
    store.write_plan("backend", "task-1", PLAN, Some(3)).unwrap();
    store
}

fn done(mode: &str) -> CompletionRequest {
    CompletionRequest::new("backend", "task-1", CompletionStatus::Done, "Endpoint shipped").with_mode(mode)
}

#[test]
fn test_strict_lists_unchecked_items() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);

    let err = store.complete(&done("strict")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ReconciliationRejected);
    let message = err.to_string();
    assert!(message.contains("2 unchecked items"));
    assert!(message.contains("Write Documentation"));
    assert!(message.contains("Performance Testing"));

    // Rejection leaves the task open
    let paths = store.paths("backend", "task-1").unwrap();
    assert_eq!(paths.status(), TaskStatus::InProgress);
    assert!(!store.check_lock("backend", "task-1").unwrap().is_locked);
}

#[test]
fn test_auto_complete_checks_everything() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);

    let outcome = store.complete(&done("auto_complete")).unwrap();
    assert!(outcome.summary.contains("Auto-completed 2 unchecked item(s)"));
    assert!(outcome.summary.contains("- Write Documentation"));

    let paths = store.paths("backend", "task-1").unwrap();
    let plan = fs::read_to_string(paths.plan_path()).unwrap();
    assert!(!plan.contains("- [ ]"));
    assert!(plan.contains("- [x] **Performance Testing**: load test the endpoint"));
    assert_eq!(paths.status(), TaskStatus::Completed);
}

#[test]
fn test_reconcile_records_explanations() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);

    let request = done("reconcile").with_explanation("Write Documentation", "Docs live in the wiki");
    let outcome = store.complete(&request).unwrap();
    assert!(outcome.summary.starts_with("Endpoint shipped"));
    assert!(outcome.summary.contains("3 planned / 1 checked / 2 reconciled"));
    assert!(outcome.summary.contains("- **Write Documentation**: Docs live in the wiki"));
    assert!(outcome
        .summary
        .contains("- **Performance Testing**: completed via alternative approach"));

    let paths = store.paths("backend", "task-1").unwrap();
    let done_md = fs::read_to_string(paths.done_path()).unwrap();
    assert!(done_md.contains("## Reconciliation"));
    assert!(!fs::read_to_string(paths.plan_path()).unwrap().contains("- [ ]"));
}

#[test]
fn test_force_leaves_plan_untouched() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);
    let paths = store.paths("backend", "task-1").unwrap();
    let before = fs::read_to_string(paths.plan_path()).unwrap();

    let outcome = store.complete(&done("force")).unwrap();
    assert!(outcome.summary.starts_with("## WARNING: FORCED COMPLETION"));
    assert!(outcome
        .recommendations
        .iter()
        .any(|r| r.contains("2 plan item(s) left unchecked")));
    assert_eq!(fs::read_to_string(paths.plan_path()).unwrap(), before);
}

#[test]
fn test_error_always_accepted() {
    let temp = TempDir::new().unwrap();
    let verifier = Arc::new(FixedVerifier::new(0));
    let store = TaskStore::new(temp.path().join("comm"), temp.path()).with_verifier(verifier.clone());
    store.create("backend", "task-1", "").unwrap();
    store.write_plan("backend", "task-1", PLAN, None).unwrap();

    let outcome = store
        .complete(&CompletionRequest::new(
            "backend",
            "task-1",
            CompletionStatus::Error,
            "Upstream API was removed",
        ))
        .unwrap();
    assert!(outcome.is_error);
    assert_eq!(verifier.call_count(), 0);

    let paths = store.paths("backend", "task-1").unwrap();
    assert_eq!(paths.status(), TaskStatus::Failed);
    assert!(fs::read_to_string(paths.error_path())
        .unwrap()
        .contains("Upstream API was removed"));
}

#[test]
fn test_confidence_threshold_is_inclusive() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 70);
    assert!(store.complete(&done("reconcile")).is_ok());

    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 69);
    let err = store.complete(&done("reconcile")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::VerificationFailed);
    assert!(err.to_string().contains("69%"));
    assert_eq!(
        store.paths("backend", "task-1").unwrap().status(),
        TaskStatus::InProgress
    );
}

#[test]
fn test_default_mode_applies_when_request_names_none() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100).with_default_mode(ReconciliationMode::AutoComplete);
    let request = CompletionRequest::new("backend", "task-1", CompletionStatus::Done, "ok");
    let outcome = store.complete(&request).unwrap();
    assert!(outcome.summary.contains("Auto-completed"));
}

#[test]
fn test_progress_then_todos_then_strict_done() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);

    store
        .report_progress(
            "backend",
            "task-1",
            &ProgressUpdate {
                step: 2,
                status: ProgressStatus::Completed,
                description: "README and rustdoc written".to_string(),
                blocker: None,
            },
        )
        .unwrap();

    let report = store
        .sync_todos(
            "backend",
            "task-1",
            &[
                TodoItem {
                    content: "performance testing".to_string(),
                    status: TodoStatus::Completed,
                },
                TodoItem {
                    content: "order pizza".to_string(),
                    status: TodoStatus::Pending,
                },
            ],
        )
        .unwrap();
    assert_eq!(report.changed_count(), 1);
    assert_eq!(report.unmatched.len(), 1);

    let snapshot = store.snapshot("backend", "task-1").unwrap();
    assert!(snapshot
        .items
        .iter()
        .all(|i| i.status == CheckboxStatus::Complete));

    let outcome = store.complete(&done("strict")).unwrap();
    assert!(outcome.summary.contains("All 3 plan items checked."));
}

#[test]
fn test_concurrent_acquire_has_one_winner() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("task");
    fs::create_dir_all(&dir).unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let dir = dir.clone();
            thread::spawn(move || {
                let manager = LockManager::default().with_pid(1000 + i);
                barrier.wait();
                manager.acquire(&dir, "race").unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.acquired).count(), 1);
    assert!(results
        .iter()
        .filter(|r| !r.acquired)
        .all(|r| r.reason.as_deref().is_some_and(|s| s.contains("race"))));
}

#[test]
fn test_stale_lock_is_reclaimed_by_writer() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);
    let paths = store.paths("backend", "task-1").unwrap();

    let mut record = LockRecord::new("crashed-agent", 999_999);
    record.timestamp = Utc::now() - Duration::seconds(120);
    fs::write(
        paths.dir().join(LOCK_FILE),
        serde_json::to_string(&record).unwrap(),
    )
    .unwrap();
    assert!(store.check_lock("backend", "task-1").unwrap().is_stale);

    store
        .complete(&CompletionRequest::new(
            "backend",
            "task-1",
            CompletionStatus::Error,
            "gave up",
        ))
        .unwrap();
    assert!(!paths.dir().join(LOCK_FILE).exists());
}

#[test]
fn test_live_lock_blocks_and_reports_holder() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);
    let paths = store.paths("backend", "task-1").unwrap();

    let other = LockManager::default().with_pid(4242);
    let held = other.acquire(paths.dir(), "report-progress").unwrap();
    assert!(held.acquired);

    let err = store
        .write_plan("backend", "task-1", PLAN, None)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TaskLocked);
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("pid 4242"));

    let released = other
        .release(paths.dir(), held.lock_id.as_deref().unwrap())
        .unwrap();
    assert!(released.released);
    assert!(store.write_plan("backend", "task-1", PLAN, None).is_ok());
}

#[test]
fn test_explanations_for_checked_items_are_ignored() {
    let temp = TempDir::new().unwrap();
    let store = planned(&temp, 100);
    let mut request = done("reconcile");
    request.reconciliation_explanations = HashMap::from([(
        "Setup Environment".to_string(),
        "already checked".to_string(),
    )]);
    let outcome = store.complete(&request).unwrap();
    assert!(!outcome.summary.contains("already checked"));
}
