//! Error strategy integration tests.
//!
//! These tests run whole plans under each strategy and check what ends up
//! in the checkpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nexus::model::{BatchStatus, TaskStatus};
use nexus::orchestration::{work, ErrorDecision, ExecutionResult, TaskContext};
use nexus::ErrorStrategy;

use crate::fixtures::{
    fast_options, task, three_batch_plan, ScriptedWork, TestProject, FEATURE,
};

/// Test: Fail-fast leaves later work pending
/// Given a failing first task under fail-fast
/// When the plan runs
/// Then later tasks and batches are never started
#[tokio::test]
async fn test_fail_fast_stops_plan() {
    let project = TestProject::new();
    let engine = project.engine(fast_options(ErrorStrategy::FailFast));
    let work = ScriptedWork::failing(&["1.1"]);

    let results = engine
        .execute_all_batches(&three_batch_plan(), work.shared(), true)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, BatchStatus::Failed);
    assert_eq!(work.calls(), vec!["1.1".to_string()]);
    assert_eq!(project.task_status("1.1"), TaskStatus::Failed);
    assert_eq!(project.task_status("1.2"), TaskStatus::Pending);
    assert_eq!(project.batch_status(2), BatchStatus::Pending);

    let checkpoint = project.store.load(FEATURE).unwrap();
    assert_eq!(checkpoint.error_log.len(), 1);
    assert_eq!(checkpoint.error_log[0].task_id, "1.1");
}

/// Test: Retry then recover
/// Given a task that fails on its first attempt only
/// When the plan runs under the retry strategy
/// Then the task completes with retry_count 1
#[tokio::test]
async fn test_retry_recovers_flaky_task() {
    let project = TestProject::new();
    let engine = project.engine(fast_options(ErrorStrategy::Retry));
    let flaky = work::shared(|ctx: TaskContext| async move {
        if ctx.task.id == "1.2" && ctx.attempt == 1 {
            return Err(nexus::Error::execution("transient"));
        }
        Ok(None)
    });

    let results = engine
        .execute_all_batches(&three_batch_plan(), flaky, true)
        .await
        .unwrap();

    assert!(results.iter().all(|r| r.status == BatchStatus::Completed));
    let checkpoint = project.store.load(FEATURE).unwrap();
    let state = checkpoint.task("1.2").unwrap();
    assert_eq!(state.status, TaskStatus::Completed);
    assert_eq!(state.retry_count, 1);
}

/// Test: Ask with a decider
/// Given a decider that retries once and then skips
/// When a task keeps failing
/// Then the task is skipped after two attempts and the run continues
#[tokio::test]
async fn test_ask_uses_decider() {
    let project = TestProject::new();
    let mut engine = project.engine(fast_options(ErrorStrategy::Ask));
    let asked = Arc::new(Mutex::new(Vec::new()));
    {
        let asked = Arc::clone(&asked);
        engine.on_error_decision(move |ctx| {
            asked.lock().unwrap().push((ctx.task_id.clone(), ctx.retry_count));
            if ctx.retry_count == 0 {
                ErrorDecision::Retry
            } else {
                ErrorDecision::Skip
            }
        });
    }
    let work = ScriptedWork::failing(&["2.1"]);

    let results = engine
        .execute_all_batches(&three_batch_plan(), work.shared(), true)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(
        *asked.lock().unwrap(),
        vec![("2.1".to_string(), 0), ("2.1".to_string(), 1)]
    );
    assert_eq!(work.calls_for("2.1"), 2);
    assert_eq!(project.task_status("2.1"), TaskStatus::Skipped);
    assert_eq!(results[1].status, BatchStatus::Completed);
}

/// Test: Ask decider aborts
/// Given a decider that aborts
/// When a task fails
/// Then the run stops like fail-fast
#[tokio::test]
async fn test_ask_abort_stops_run() {
    let project = TestProject::new();
    let mut engine = project.engine(fast_options(ErrorStrategy::Ask));
    engine.on_error_decision(|_| ErrorDecision::Abort);

    let results = engine
        .execute_all_batches(&three_batch_plan(), ScriptedWork::failing(&["1.2"]).shared(), true)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(project.task_status("1.2"), TaskStatus::Failed);
    assert_eq!(project.batch_status(3), BatchStatus::Pending);
}

/// Test: Ask without a decider
/// Given the ask strategy and no registered decider
/// When a task keeps failing
/// Then the retry policy applies and the task fails after 1 + max_retries attempts
#[tokio::test]
async fn test_ask_without_decider_falls_back_to_retry() {
    let project = TestProject::new();
    let engine = project.engine(fast_options(ErrorStrategy::Ask));
    let work = ScriptedWork::failing(&["3.1"]);

    let results = engine
        .execute_all_batches(&three_batch_plan(), work.shared(), true)
        .await
        .unwrap();

    assert_eq!(work.calls_for("3.1"), 3);
    assert_eq!(results[2].status, BatchStatus::Failed);
    assert_eq!(project.task_status("3.1"), TaskStatus::Failed);
}

/// Test: Timeout
/// Given a task slower than the task timeout and no retries
/// When it runs
/// Then it is reported as a timeout and persisted as failed
#[tokio::test]
async fn test_timeout_is_persisted_as_failed() {
    let project = TestProject::new();
    let mut options = fast_options(ErrorStrategy::Retry);
    options.task_timeout = Duration::from_millis(50);
    options.max_retries = 0;
    let engine = project.engine(options);
    let plan = vec![nexus::BatchSpec::serial(1, "Slow", vec![task("1.1")])];
    let slow = ScriptedWork::new().with_delay(Duration::from_secs(2));

    let results = engine
        .execute_all_batches(&plan, slow.shared(), true)
        .await
        .unwrap();

    let result = &results[0].task_results[0];
    assert_eq!(result.result, ExecutionResult::Timeout);
    assert!(result.error.as_deref().unwrap_or("").contains("timed out"));
    let checkpoint = project.store.load(FEATURE).unwrap();
    let state = checkpoint.task("1.1").unwrap();
    assert_eq!(state.status, TaskStatus::Failed);
    assert!(state.error_message.is_some());
}
