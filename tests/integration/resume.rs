//! Resume integration tests.
//!
//! These tests verify that a run stopped part way through picks up from
//! the persisted checkpoint with a fresh engine.

use std::time::Duration;

use nexus::model::{BatchStatus, TaskStatus};
use nexus::ErrorStrategy;

use crate::fixtures::{fast_options, three_batch_plan, ScriptedWork, TestProject, FEATURE};

/// Test: Resume after a fail-fast stop
/// Given a run that aborted on the second task of batch 1
/// When a new engine resumes once the task is fixed
/// Then batch 1 is re-entered in full and the later batches run
#[tokio::test]
async fn test_resume_after_fail_fast() {
    let project = TestProject::new();
    let plan = three_batch_plan();

    let work = ScriptedWork::failing(&["1.2"]);
    let first = project.engine(fast_options(ErrorStrategy::FailFast));
    let results = first
        .execute_all_batches(&plan, work.shared(), true)
        .await
        .unwrap();

    assert_eq!(results.len(), 1, "run should stop after batch 1");
    assert_eq!(results[0].status, BatchStatus::Partial);
    assert_eq!(project.task_status("1.1"), TaskStatus::Completed);
    assert_eq!(project.task_status("1.2"), TaskStatus::Failed);
    assert_eq!(project.batch_status(2), BatchStatus::Pending);

    let point = project.store.get_resume_point(FEATURE).unwrap();
    assert_eq!(point.batch_id, 1);
    assert_eq!(point.completed_tasks, vec!["1.1".to_string()]);
    assert_eq!(
        point.incomplete_tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
        vec!["1.2"]
    );

    work.heal("1.2");
    let second = project.engine(fast_options(ErrorStrategy::FailFast));
    let results = second
        .execute_all_batches(&plan, work.shared(), true)
        .await
        .unwrap();

    assert_eq!(
        results.iter().map(|r| r.batch_id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(results.iter().all(|r| r.status == BatchStatus::Completed));
    assert_eq!(work.calls_for("1.1"), 2, "a partial batch is re-entered in full");
    assert_eq!(work.calls_for("3.1"), 1);

    let summary = project.store.get_execution_summary(FEATURE).unwrap();
    assert_eq!(summary.progress.tasks, "6/6");
    assert_eq!(summary.progress.percentage, 100.0);
    assert!(project.store.get_resume_point(FEATURE).is_none());
}

/// Test: Resume after cancellation
/// Given a run cancelled from inside batch 2
/// When a new engine resumes
/// Then completed batch 1 is skipped and nothing is left pending
#[tokio::test]
async fn test_resume_after_cancel() {
    let project = TestProject::new();
    let plan = three_batch_plan();

    let work = ScriptedWork::new().cancel_on("2.2");
    let first = project.engine(fast_options(ErrorStrategy::Retry));
    let results = first
        .execute_all_batches(&plan, work.shared(), true)
        .await
        .unwrap();

    // Tasks still running at cancellation are detached; let them settle.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(first.is_cancelled());
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, BatchStatus::Completed);
    assert_eq!(results[1].status, BatchStatus::Partial);
    assert_eq!(project.task_status("2.2"), TaskStatus::Pending);
    assert_eq!(project.batch_status(3), BatchStatus::Pending);
    assert_eq!(project.store.get_resume_point(FEATURE).unwrap().batch_id, 2);

    let rerun = ScriptedWork::new();
    let second = project.engine(fast_options(ErrorStrategy::Retry));
    let results = second
        .execute_all_batches(&plan, rerun.shared(), true)
        .await
        .unwrap();

    assert_eq!(
        results.iter().map(|r| r.batch_id).collect::<Vec<_>>(),
        vec![2, 3]
    );
    assert_eq!(rerun.calls_for("1.1"), 0);
    assert_eq!(rerun.calls_for("2.2"), 1);
    let summary = project.store.get_execution_summary(FEATURE).unwrap();
    assert_eq!(summary.progress.tasks, "6/6");
    assert_eq!(summary.status.pending, 0);
}

/// Test: Fresh run ignores the stored checkpoint
/// Given a completed run
/// When the plan is executed without resume
/// Then every task runs again under a new execution id
#[tokio::test]
async fn test_fresh_run_replaces_checkpoint() {
    let project = TestProject::new();
    let plan = three_batch_plan();
    let work = ScriptedWork::new();

    project
        .engine(fast_options(ErrorStrategy::Retry))
        .execute_all_batches(&plan, work.shared(), true)
        .await
        .unwrap();
    let first_id = project.store.load(FEATURE).unwrap().execution_id;

    let results = project
        .engine(fast_options(ErrorStrategy::Retry))
        .execute_all_batches(&plan, work.shared(), false)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(work.calls_for("1.1"), 2);
    assert_ne!(project.store.load(FEATURE).unwrap().execution_id, first_id);
}

/// Test: Resuming with a changed plan
/// Given a checkpoint for a different task set
/// When the engine resumes with the new plan
/// Then it starts a fresh checkpoint instead of mixing the two
#[tokio::test]
async fn test_resume_with_changed_plan_starts_fresh() {
    let project = TestProject::new();
    let work = ScriptedWork::new();

    let old_plan = vec![nexus::BatchSpec::serial(
        1,
        "Old",
        vec![crate::fixtures::task("9.9")],
    )];
    project
        .engine(fast_options(ErrorStrategy::Retry))
        .execute_all_batches(&old_plan, work.shared(), true)
        .await
        .unwrap();

    let results = project
        .engine(fast_options(ErrorStrategy::Retry))
        .execute_all_batches(&three_batch_plan(), work.shared(), true)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let checkpoint = project.store.load(FEATURE).unwrap();
    assert!(checkpoint.task("9.9").is_none());
    assert_eq!(checkpoint.total_batches, 3);
}
