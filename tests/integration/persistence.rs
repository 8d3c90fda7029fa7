//! On-disk persistence integration tests.
//!
//! These tests look at the files the store and the audit log leave behind.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use nexus::audit::AuditLog;
use nexus::model::{BatchStatus, TaskStatus};
use nexus::{BatchSpec, CheckpointStore, ErrorStrategy, ExecutionEngine};

use crate::fixtures::{fast_options, task, three_batch_plan, ScriptedWork, TestProject, FEATURE};

/// Test: Interrupted temp write
/// Given a committed checkpoint and a half-written temp file beside it
/// When the checkpoint is loaded and updated again
/// Then the previous version loads intact and the next write succeeds
#[test]
fn test_interrupted_write_keeps_previous_version() {
    let project = TestProject::new();
    let store = &project.store;
    store.create(FEATURE, &three_batch_plan()).unwrap();
    assert!(store.update_task_status(FEATURE, "1.1", TaskStatus::Completed, None, Some("ok")));

    std::fs::write(store.temp_path(FEATURE), b"{\"feature_name\": \"user-a").unwrap();

    let checkpoint = store.load(FEATURE).expect("previous version should load");
    assert_eq!(checkpoint.task("1.1").unwrap().status, TaskStatus::Completed);

    assert!(store.update_task_status(FEATURE, "1.2", TaskStatus::Completed, None, None));
    assert!(!store.temp_path(FEATURE).exists());
    let checkpoint = store.load(FEATURE).unwrap();
    assert_eq!(checkpoint.task("1.2").unwrap().status, TaskStatus::Completed);
}

/// Test: Resume point from persisted state
/// Given batches [A:completed, B:partial, C:pending]
/// When a fresh store instance computes the resume point
/// Then it returns B with its pending and failed tasks to redo
#[test]
fn test_resume_point_from_disk() {
    let project = TestProject::new();
    let plan = vec![
        BatchSpec::serial(1, "A", vec![task("a.1")]),
        BatchSpec::parallel(2, "B", vec![task("b.1"), task("b.2"), task("b.3")]),
        BatchSpec::serial(3, "C", vec![task("c.1")]),
    ];
    let store = &project.store;
    store.create(FEATURE, &plan).unwrap();
    store.update_task_status(FEATURE, "a.1", TaskStatus::Completed, None, None);
    store.update_batch_status(FEATURE, 1, BatchStatus::Completed);
    store.update_task_status(FEATURE, "b.1", TaskStatus::Completed, None, None);
    store.update_task_status(FEATURE, "b.2", TaskStatus::Failed, Some("boom"), None);
    store.update_batch_status(FEATURE, 2, BatchStatus::Partial);

    let reopened = CheckpointStore::new(store.dir());
    let point = reopened.get_resume_point(FEATURE).unwrap();
    assert_eq!(point.batch_id, 2);
    assert_eq!(point.batch_name, "B");
    assert_eq!(point.completed_tasks, vec!["b.1".to_string()]);
    let redo: Vec<_> = point.incomplete_tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(redo, vec!["b.2", "b.3"]);
}

/// Test: Checkpoint document layout
/// Given a finished run
/// When the checkpoint file is read as plain JSON
/// Then it is pretty-printed and carries the expected top-level fields
#[tokio::test]
async fn test_checkpoint_file_layout() {
    let project = TestProject::new();
    project
        .engine(fast_options(ErrorStrategy::Retry))
        .execute_all_batches(&three_batch_plan(), ScriptedWork::new().shared(), true)
        .await
        .unwrap();

    let raw = std::fs::read_to_string(project.store.checkpoint_path(FEATURE)).unwrap();
    assert!(raw.contains("\n  \""), "checkpoint should be pretty-printed");
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["feature_name"], FEATURE);
    assert_eq!(doc["total_batches"], 3);
    assert_eq!(doc["batches"][1]["batch_type"], "parallel");
    assert_eq!(doc["batches"][1]["status"], "completed");
    assert_eq!(doc["batches"][0]["tasks"][0]["result"], "1.1 done");
    assert!(doc["execution_id"].as_str().is_some_and(|id| id.len() == 8));
}

/// Test: Audit trail
/// Given an engine streaming events to an audit log
/// When a plan with one retried task finishes
/// Then the JSONL file records the run from start to completion
#[tokio::test]
async fn test_audit_trail_written() {
    let project = TestProject::new();
    let log_dir = project.temp_dir.path().join(".nexus-temp").join("logs");
    let (tx, rx) = mpsc::unbounded_channel();
    let audit = AuditLog::new(&log_dir, FEATURE).spawn(rx);

    let engine = ExecutionEngine::new(
        FEATURE,
        Arc::clone(&project.store),
        fast_options(ErrorStrategy::Retry),
    )
    .with_events(tx);
    let work = ScriptedWork::failing(&["3.1"]);
    engine
        .execute_all_batches(&three_batch_plan(), work.shared(), true)
        .await
        .unwrap();
    let execution_id = project.store.load(FEATURE).unwrap().execution_id;
    drop(engine);

    let stats = tokio::time::timeout(Duration::from_secs(5), audit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.total_tasks, 6);
    assert_eq!(stats.completed_tasks, 5);
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.retried_tasks, 2);
    assert_eq!(stats.executor_calls.get("claude"), Some(&6));

    let path = AuditLog::path_for(&log_dir, FEATURE, &execution_id);
    let records = AuditLog::read_records(&path).unwrap();
    assert_eq!(records.first().unwrap().event_type, "execution_start");
    assert_eq!(records.last().unwrap().event_type, "execution_complete");
    assert!(records
        .iter()
        .any(|r| r.event_type == "task_retry" && r.task_id.as_deref() == Some("3.1")));
}

/// Test: Listing and deleting checkpoints
/// Given checkpoints for two features
/// When one is deleted
/// Then only the other is listed
#[test]
fn test_list_and_delete() {
    let project = TestProject::new();
    let store = &project.store;
    store.create("billing", &three_batch_plan()).unwrap();
    store.create(FEATURE, &three_batch_plan()).unwrap();

    let names: Vec<_> = store
        .list_checkpoints()
        .into_iter()
        .map(|s| s.feature_name)
        .collect();
    assert_eq!(names, vec!["billing".to_string(), FEATURE.to_string()]);

    assert!(store.delete("billing"));
    assert!(!store.exists("billing"));
    assert_eq!(store.list_checkpoints().len(), 1);
}
