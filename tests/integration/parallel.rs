//! Parallel batch integration tests.
//!
//! These tests verify the concurrency bound and that every submitted task
//! yields exactly one result.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nexus::model::{BatchStatus, TaskStatus};
use nexus::orchestration::{work, ExecutionResult, ShellWork, TaskContext};
use nexus::{BatchSpec, ErrorStrategy, TaskSpec};

use crate::fixtures::{fast_options, wide_batch, ScriptedWork, TestProject, FEATURE};

/// Test: Concurrency bound
/// Given a parallel batch of 8 slow tasks and max_parallel = 3
/// When the batch runs
/// Then no more than 3 tasks are ever in flight
#[tokio::test]
async fn test_parallel_respects_limit() {
    let project = TestProject::new();
    let mut options = fast_options(ErrorStrategy::Retry);
    options.max_parallel = 3;
    let engine = project.engine(options);

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let slow = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        work::shared(move |_ctx: TaskContext| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(None)
            }
        })
    };

    let results = engine
        .execute_all_batches(&[wide_batch(8)], slow, true)
        .await
        .unwrap();

    assert_eq!(results[0].status, BatchStatus::Completed);
    assert_eq!(results[0].task_results.len(), 8);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded the limit");
    assert!(peak >= 2, "tasks should overlap, peak was {peak}");
}

/// Test: Parallel completeness
/// Given 20 parallel tasks, 5 of which always fail
/// When the batch runs under the retry strategy
/// Then there are 20 distinct results and the batch is partial
#[tokio::test]
async fn test_parallel_completeness_with_failures() {
    let project = TestProject::new();
    let engine = project.engine(fast_options(ErrorStrategy::Retry));
    let failing = ["p.0", "p.4", "p.9", "p.13", "p.19"];
    let work = ScriptedWork::failing(&failing);

    let results = engine
        .execute_all_batches(&[wide_batch(20)], work.shared(), true)
        .await
        .unwrap();
    let batch = &results[0];

    let ids: HashSet<_> = batch.task_results.iter().map(|r| r.task_id.clone()).collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(batch.success_count(), 15);
    assert_eq!(batch.failed_count(), 5);
    assert_eq!(batch.status, BatchStatus::Partial);

    for id in failing {
        assert_eq!(work.calls_for(id), 3, "{id} should get 1 + max_retries attempts");
        assert_eq!(project.task_status(id), TaskStatus::Failed);
    }
    let checkpoint = project.store.load(FEATURE).unwrap();
    assert_eq!(checkpoint.task("p.4").unwrap().retry_count, 2);
    assert_eq!(checkpoint.task("p.1").unwrap().status, TaskStatus::Completed);
}

/// Test: Skipped tasks do not fail a parallel batch
/// Given failing tasks under the skip strategy
/// When the batch runs
/// Then the batch completes with those tasks skipped
#[tokio::test]
async fn test_parallel_skip_completes_batch() {
    let project = TestProject::new();
    let engine = project.engine(fast_options(ErrorStrategy::Skip));
    let work = ScriptedWork::failing(&["p.1", "p.2"]);

    let results = engine
        .execute_all_batches(&[wide_batch(6)], work.shared(), true)
        .await
        .unwrap();

    assert_eq!(results[0].status, BatchStatus::Completed);
    assert_eq!(results[0].skipped_count(), 2);
    assert_eq!(work.calls_for("p.1"), 1);
    assert_eq!(project.task_status("p.2"), TaskStatus::Skipped);
}

/// Test: Progress updates
/// Given a parallel batch of 5 tasks
/// When the batch runs
/// Then one progress update arrives per task, ending at 5/5
#[tokio::test]
async fn test_parallel_progress_updates() {
    let project = TestProject::new();
    let mut engine = project.engine(fast_options(ErrorStrategy::Retry));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        engine.on_progress_update(move |update| seen.lock().unwrap().push(update.completed));
    }

    engine
        .execute_all_batches(&[wide_batch(5)], ScriptedWork::new().shared(), true)
        .await
        .unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

/// Test: Shell commands in a parallel batch
/// Given tasks whose commands echo their task id
/// When run through ShellWork
/// Then each task's stored result is its own id
#[tokio::test]
async fn test_parallel_shell_work() {
    let project = TestProject::new();
    let engine = project.engine(fast_options(ErrorStrategy::Retry));
    let tasks = (1..=4)
        .map(|i| {
            TaskSpec::new(&format!("s.{i}"), "echo", "sh").with_command("echo \"$NEXUS_TASK_ID\"")
        })
        .collect();
    let plan = vec![BatchSpec::parallel(1, "Shell", tasks)];

    let results = engine
        .execute_all_batches(&plan, work::shared(ShellWork::new(project.temp_dir.path())), true)
        .await
        .unwrap();

    assert!(results[0]
        .task_results
        .iter()
        .all(|r| r.result == ExecutionResult::Success));
    let checkpoint = project.store.load(FEATURE).unwrap();
    for i in 1..=4 {
        let id = format!("s.{i}");
        assert_eq!(checkpoint.task(&id).unwrap().result.as_deref(), Some(id.as_str()));
    }
}
