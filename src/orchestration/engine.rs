//! ExecutionEngine - drives a feature's batches against the checkpoint store.
//!
//! Every task goes `pending -> in_progress -> {completed | failed | skipped}`
//! under a bounded retry loop; a cancelled task is put back to `pending` so
//! a later resume redoes it. Every transition is persisted before the engine
//! moves on.
//!
//! Cancellation is cooperative: one `CancellationToken` is shared by the
//! engine and every `TaskContext`. It is checked when a batch schedules a
//! task, before each attempt and during retry delays. Work already running
//! is never forcibly stopped.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::events::{
    BatchResult, Callbacks, EngineEvent, ExecutionResult, ProgressUpdate, TaskResult,
};
use super::strategy::{self, ErrorContext, ErrorDecision, ErrorStrategy};
use super::work::{SharedWork, TaskContext};
use crate::model::{
    validate_specs, BatchSpec, BatchStatus, BatchType, Checkpoint, ExecutionSummary, TaskSpec,
    TaskStatus,
};
use crate::state::CheckpointStore;
use crate::util::{blocking, spawn_with_timeout};
use crate::{nlog, nlog_debug, nlog_error, nlog_trace, nlog_warn, Error, Result};

/// Engine tuning, usually derived from `config::ExecutionConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Permits for parallel batches.
    pub max_parallel: usize,
    /// How long the engine waits on one attempt.
    pub task_timeout: Duration,
    pub error_strategy: ErrorStrategy,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            task_timeout: Duration::from_secs(10 * 60),
            error_strategy: ErrorStrategy::Ask,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Snapshot returned by `ExecutionEngine::get_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub feature_name: String,
    pub cancelled: bool,
    pub paused: bool,
    pub current_batch: u32,
    pub checkpoint: Option<ExecutionSummary>,
}

enum Outcome {
    Success(Option<String>),
    Failed,
    Skipped,
    Cancelled,
    /// Failed and the strategy asked to stop the run.
    Aborted,
}

/// Running counts for progress updates.
#[derive(Default)]
struct Tally {
    reported: usize,
    success: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, result: &TaskResult) {
        self.reported += 1;
        if result.result == ExecutionResult::Success {
            self.success += 1;
        } else if result.result.is_failure() {
            self.failed += 1;
        }
    }

    fn progress(&self, batch_id: u32, total: usize) -> ProgressUpdate {
        ProgressUpdate {
            batch_id,
            completed: self.reported,
            total,
            success: self.success,
            failed: self.failed,
        }
    }
}

/// State shared between the engine, its clones and spawned tasks.
struct Shared {
    feature_name: String,
    store: Arc<CheckpointStore>,
    options: EngineOptions,
    cancel: CancellationToken,
    /// Set when a task's failure stopped the run under fail-fast.
    aborted: AtomicBool,
    paused: watch::Sender<bool>,
    current_batch: AtomicU32,
}

/// Executes one feature's batches.
///
/// Clones share cancellation, pause state and the store. Callbacks and the
/// event channel are copied at clone time, so register them first.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(CheckpointStore::new(".nexus-temp/checkpoints"));
/// let mut engine = ExecutionEngine::new("login", store, EngineOptions::default());
/// engine.on_task_complete(|r| println!("{} {}", r.task_id, r.result));
///
/// let work = work::shared(|ctx: TaskContext| async move { Ok(Some(ctx.task.name)) });
/// let results = engine.execute_all_batches(&plan.batches, work, true).await?;
/// ```
#[derive(Clone)]
pub struct ExecutionEngine {
    shared: Arc<Shared>,
    callbacks: Callbacks,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("feature_name", &self.shared.feature_name)
            .field("options", &self.shared.options)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl ExecutionEngine {
    pub fn new(
        feature_name: impl Into<String>,
        store: Arc<CheckpointStore>,
        options: EngineOptions,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                feature_name: feature_name.into(),
                store,
                options,
                cancel: CancellationToken::new(),
                aborted: AtomicBool::new(false),
                paused,
                current_batch: AtomicU32::new(0),
            }),
            callbacks: Callbacks::default(),
            events: None,
        }
    }

    /// Stream lifecycle events to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn feature_name(&self) -> &str {
        &self.shared.feature_name
    }

    pub fn options(&self) -> &EngineOptions {
        &self.shared.options
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.shared.store
    }

    // ---- callback registration ----

    pub fn on_task_start<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.callbacks.task_start = Some(Arc::new(f));
        self
    }

    pub fn on_task_complete<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&TaskResult) + Send + Sync + 'static,
    {
        self.callbacks.task_complete = Some(Arc::new(f));
        self
    }

    pub fn on_batch_complete<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&BatchResult) + Send + Sync + 'static,
    {
        self.callbacks.batch_complete = Some(Arc::new(f));
        self
    }

    pub fn on_progress_update<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.callbacks.progress_update = Some(Arc::new(f));
        self
    }

    /// Consulted on failures when the strategy is `Ask`.
    pub fn on_error_decision<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&ErrorContext) -> ErrorDecision + Send + Sync + 'static,
    {
        self.callbacks.error_decision = Some(Arc::new(f));
        self
    }

    // ---- control ----

    /// Request cooperative cancellation of the whole run.
    pub fn cancel(&self) {
        nlog!("Cancellation requested for {}", self.shared.feature_name);
        self.shared.cancel.cancel();
    }

    /// Hold before the next task is started or scheduled.
    pub fn pause(&self) {
        nlog!("Pausing {}", self.shared.feature_name);
        self.shared.paused.send_replace(true);
    }

    pub fn resume(&self) {
        nlog!("Resuming {}", self.shared.feature_name);
        self.shared.paused.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// The token handed to every work invocation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub fn get_status(&self) -> EngineStatus {
        EngineStatus {
            feature_name: self.shared.feature_name.clone(),
            cancelled: self.is_cancelled(),
            paused: self.is_paused(),
            current_batch: self.shared.current_batch.load(Ordering::SeqCst),
            checkpoint: self
                .shared
                .store
                .get_execution_summary(&self.shared.feature_name),
        }
    }

    fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    fn abort(&self) {
        nlog_warn!("Aborting {} after task failure", self.shared.feature_name);
        self.shared.aborted.store(true, Ordering::SeqCst);
        self.shared.cancel.cancel();
    }

    /// Cancelled by a caller rather than by fail-fast.
    fn interrupted(&self) -> bool {
        self.is_cancelled() && !self.is_aborted()
    }

    async fn wait_if_paused(&self) {
        let mut rx = self.shared.paused.subscribe();
        let mut logged = false;
        loop {
            let paused = *rx.borrow_and_update();
            if !paused || self.is_cancelled() {
                return;
            }
            if !logged {
                nlog_debug!("{} paused; waiting", self.shared.feature_name);
                logged = true;
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = self.shared.cancel.cancelled() => return,
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run a store call on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&CheckpointStore, &str) -> T + Send + 'static,
        T: Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        match blocking(move || Ok(f(&shared.store, &shared.feature_name))).await {
            Ok(value) => Some(value),
            Err(e) => {
                nlog_error!("Checkpoint store call failed: {}", e);
                None
            }
        }
    }

    async fn persist_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
        result: Option<String>,
    ) -> bool {
        let task_id = task_id.to_string();
        self.with_store(move |store, feature| {
            store.update_task_status(
                feature,
                &task_id,
                status,
                error.as_deref(),
                result.as_deref(),
            )
        })
        .await
        .unwrap_or(false)
    }

    async fn persist_batch(&self, batch_id: u32, status: BatchStatus) -> bool {
        self.with_store(move |store, feature| store.update_batch_status(feature, batch_id, status))
            .await
            .unwrap_or(false)
    }

    // ---- task ----

    /// Run one task to a terminal outcome.
    ///
    /// Failures are absorbed here: the returned `TaskResult` says what
    /// happened and the checkpoint already reflects it.
    pub async fn execute_task(
        &self,
        batch_id: u32,
        task: &TaskSpec,
        work: &SharedWork,
        timeout: Duration,
    ) -> TaskResult {
        let (result, abort) = self.run_task(batch_id, task, work, timeout).await;
        if abort {
            self.abort();
        }
        result
    }

    /// Like `execute_task`, but leaves the abort to the caller so a parallel
    /// batch can record the result before it stops collecting.
    async fn run_task(
        &self,
        batch_id: u32,
        task: &TaskSpec,
        work: &SharedWork,
        timeout: Duration,
    ) -> (TaskResult, bool) {
        let started = Instant::now();
        let options = &self.shared.options;
        let cancel = &self.shared.cancel;

        self.callbacks.task_started(&task.id, &task.name);
        self.emit(EngineEvent::TaskStarted {
            batch_id,
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            executor: task.executor.clone(),
        });
        nlog!("Task {} ({}) started on {}", task.id, task.name, task.executor);
        self.persist_task(&task.id, TaskStatus::InProgress, None, None)
            .await;

        let mut retry_count = 0u32;
        let mut last_error: Option<String> = None;
        let mut timed_out = false;

        let outcome = loop {
            if cancel.is_cancelled() {
                break Outcome::Cancelled;
            }

            let attempt = retry_count + 1;
            nlog_trace!("Task {} attempt {}", task.id, attempt);
            let ctx = TaskContext {
                batch_id,
                task: task.clone(),
                attempt,
                cancel: cancel.clone(),
            };
            let error = match spawn_with_timeout(timeout, work.run(ctx)).await {
                Ok(output) => break Outcome::Success(output),
                Err(e) => e,
            };

            timed_out = matches!(error, Error::ExecutionTimeout(_));
            let message = error.to_string();
            nlog_warn!("Task {} attempt {} failed: {}", task.id, attempt, message);
            self.emit(EngineEvent::TaskError {
                batch_id,
                task_id: task.id.clone(),
                error: message.clone(),
            });
            last_error = Some(message.clone());

            if cancel.is_cancelled() {
                break Outcome::Cancelled;
            }

            let context = ErrorContext {
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                error: message,
                retry_count,
                max_retries: options.max_retries,
            };
            let decider = self.callbacks.decider();
            let decision = strategy::resolve(options.error_strategy, &context, decider);
            let budget_spent = !context.retries_remaining();
            nlog_debug!(
                "Task {} resolved {:?} (retries {}/{})",
                task.id,
                decision,
                retry_count,
                options.max_retries
            );

            match decision {
                ErrorDecision::Retry if budget_spent => break Outcome::Failed,
                ErrorDecision::Retry => {
                    let interrupted = tokio::select! {
                        _ = tokio::time::sleep(options.retry_delay) => false,
                        _ = cancel.cancelled() => true,
                    };
                    if interrupted {
                        break Outcome::Cancelled;
                    }
                    retry_count += 1;
                    let task_id = task.id.clone();
                    self.with_store(move |store, feature| {
                        store.set_retry_count(feature, &task_id, retry_count)
                    })
                    .await;
                    nlog!(
                        "Retrying task {} ({}/{})",
                        task.id,
                        retry_count,
                        options.max_retries
                    );
                    self.emit(EngineEvent::TaskRetry {
                        batch_id,
                        task_id: task.id.clone(),
                        attempt: retry_count + 1,
                        error: context.error,
                    });
                }
                ErrorDecision::Skip
                    if budget_spent
                        && strategy::retry_policy_applies(
                            options.error_strategy,
                            decider.is_some(),
                        ) =>
                {
                    break Outcome::Failed
                }
                ErrorDecision::Skip => break Outcome::Skipped,
                ErrorDecision::Abort => break Outcome::Aborted,
            }
        };

        let aborted = matches!(outcome, Outcome::Aborted);
        let (result, output, error) = match outcome {
            Outcome::Success(output) => {
                self.persist_task(&task.id, TaskStatus::Completed, None, output.clone())
                    .await;
                (ExecutionResult::Success, output, None)
            }
            Outcome::Failed | Outcome::Aborted => {
                self.persist_task(&task.id, TaskStatus::Failed, last_error.clone(), None)
                    .await;
                let result = if timed_out {
                    ExecutionResult::Timeout
                } else {
                    ExecutionResult::Failed
                };
                (result, None, last_error)
            }
            Outcome::Skipped => {
                self.persist_task(&task.id, TaskStatus::Skipped, last_error.clone(), None)
                    .await;
                (ExecutionResult::Skipped, None, last_error)
            }
            Outcome::Cancelled => {
                self.persist_task(&task.id, TaskStatus::Pending, None, None)
                    .await;
                let error = last_error.unwrap_or_else(|| "execution cancelled".to_string());
                (ExecutionResult::Cancelled, None, Some(error))
            }
        };

        let task_result = TaskResult {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            executor: task.executor.clone(),
            result,
            output,
            error,
            duration: started.elapsed(),
            retry_count,
        };
        nlog!(
            "Task {} finished: {} after {} retries in {:?}",
            task.id,
            result,
            retry_count,
            task_result.duration
        );
        self.callbacks.task_completed(&task_result);
        self.emit(EngineEvent::TaskCompleted {
            batch_id,
            task_id: task.id.clone(),
            executor: task.executor.clone(),
            result,
            duration: task_result.duration,
        });
        (task_result, aborted)
    }

    // ---- batches ----

    async fn begin_batch(&self, batch: &BatchSpec) {
        self.shared.current_batch.store(batch.id, Ordering::SeqCst);
        self.persist_batch(batch.id, BatchStatus::InProgress).await;
        nlog!(
            "Batch {} ({}, {}) started with {} tasks",
            batch.id,
            batch.name,
            batch.batch_type,
            batch.tasks.len()
        );
        self.emit(EngineEvent::BatchStarted {
            batch_id: batch.id,
            batch_name: batch.name.clone(),
            batch_type: batch.batch_type,
            task_count: batch.tasks.len(),
        });
    }

    async fn finish_batch(
        &self,
        batch: &BatchSpec,
        task_results: Vec<TaskResult>,
        started: Instant,
    ) -> BatchResult {
        let mut result = BatchResult {
            batch_id: batch.id,
            batch_name: batch.name.clone(),
            batch_type: batch.batch_type,
            status: BatchStatus::Pending,
            task_results,
            duration: started.elapsed(),
        };
        let (success, failed, skipped) = (
            result.success_count(),
            result.failed_count(),
            result.skipped_count(),
        );
        result.status = BatchStatus::derive(
            success,
            failed,
            success + failed + skipped,
            batch.tasks.len(),
            self.interrupted(),
        );

        self.persist_batch(batch.id, result.status).await;
        nlog!(
            "Batch {} finished: {} ({} ok, {} failed, {} skipped) in {:?}",
            batch.id,
            result.status,
            success,
            failed,
            skipped,
            result.duration
        );
        self.callbacks.batch_completed(&result);
        self.emit(EngineEvent::BatchCompleted {
            batch_id: batch.id,
            status: result.status,
            success,
            failed,
            skipped,
            duration: result.duration,
        });
        result
    }

    /// Run a batch's tasks one at a time in list order.
    ///
    /// Stops before the next task when cancelled and after a task whose
    /// failure aborted the run; the remaining tasks stay pending.
    pub async fn execute_batch_serial(&self, batch: &BatchSpec, work: &SharedWork) -> BatchResult {
        let started = Instant::now();
        self.begin_batch(batch).await;

        let total = batch.tasks.len();
        let mut results = Vec::with_capacity(total);
        let mut tally = Tally::default();
        for task in &batch.tasks {
            self.wait_if_paused().await;
            if self.is_cancelled() {
                nlog!("Batch {} stopped before task {}", batch.id, task.id);
                break;
            }

            let result = self
                .execute_task(batch.id, task, work, self.shared.options.task_timeout)
                .await;
            tally.record(&result);
            results.push(result);
            self.callbacks.progress(&tally.progress(batch.id, total));

            if self.is_aborted() {
                break;
            }
        }

        self.finish_batch(batch, results, started).await
    }

    /// Run a batch's tasks concurrently, at most `max_parallel` at a time.
    ///
    /// Results arrive in completion order. Once cancellation is observed,
    /// tasks still waiting for a permit are dropped and running ones are
    /// detached to finish on their own.
    pub async fn execute_batch_parallel(
        &self,
        batch: &BatchSpec,
        work: &SharedWork,
        max_parallel: usize,
    ) -> BatchResult {
        let started = Instant::now();
        self.begin_batch(batch).await;

        let total = batch.tasks.len();
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut set = JoinSet::new();
        for task in &batch.tasks {
            let engine = self.clone();
            let work = Arc::clone(work);
            let semaphore = Arc::clone(&semaphore);
            let task = task.clone();
            let batch_id = batch.id;
            set.spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok()?,
                    _ = engine.shared.cancel.cancelled() => return None,
                };
                engine.wait_if_paused().await;
                if engine.is_cancelled() {
                    return None;
                }
                let timeout = engine.shared.options.task_timeout;
                let outcome = engine.run_task(batch_id, &task, &work, timeout).await;
                drop(permit);
                Some(outcome)
            });
        }

        let mut results = Vec::with_capacity(total);
        let mut tally = Tally::default();
        let mut record = |(result, abort): (TaskResult, bool), engine: &Self| {
            tally.record(&result);
            results.push(result);
            engine.callbacks.progress(&tally.progress(batch.id, total));
            if abort {
                engine.abort();
            }
        };

        let mut cancelled = false;
        loop {
            let joined = tokio::select! {
                biased;
                joined = set.join_next() => joined,
                _ = self.shared.cancel.cancelled() => {
                    cancelled = true;
                    None
                }
            };
            match joined {
                None => break,
                Some(Ok(Some(outcome))) => record(outcome, self),
                Some(Ok(None)) => {}
                Some(Err(e)) => {
                    nlog_error!("Parallel task in batch {} failed to join: {}", batch.id, e)
                }
            }
        }

        if cancelled {
            while let Some(joined) = set.try_join_next() {
                if let Ok(Some(outcome)) = joined {
                    record(outcome, self);
                }
            }
            if !set.is_empty() {
                nlog!(
                    "Batch {} cancelled; detaching {} running tasks",
                    batch.id,
                    set.len()
                );
            }
            set.detach_all();
        }

        self.finish_batch(batch, results, started).await
    }

    // ---- run ----

    async fn prepare_checkpoint(&self, specs: &[BatchSpec], resume: bool) -> Result<Checkpoint> {
        validate_specs(specs)?;

        if resume {
            let existing = self
                .with_store(|store, feature| store.load(feature))
                .await
                .flatten();
            if let Some(checkpoint) = existing {
                if covers(&checkpoint, specs) {
                    self.shared
                        .current_batch
                        .store(checkpoint.current_batch, Ordering::SeqCst);
                    self.report_resume(&checkpoint);
                    return Ok(checkpoint);
                }
                nlog_warn!(
                    "Checkpoint for {} does not match the plan; starting fresh",
                    self.shared.feature_name
                );
            }
        }

        let specs = specs.to_vec();
        let shared = Arc::clone(&self.shared);
        blocking(move || shared.store.create(&shared.feature_name, &specs)).await
    }

    fn report_resume(&self, checkpoint: &Checkpoint) {
        match checkpoint.resume_point() {
            Some(point) => {
                nlog!(
                    "Resuming {} from batch {} ({}): {} incomplete, {} completed",
                    checkpoint.feature_name,
                    point.batch_id,
                    point.batch_name,
                    point.incomplete_tasks.len(),
                    point.completed_tasks.len()
                );
                self.emit(EngineEvent::CheckpointResumed {
                    feature_name: checkpoint.feature_name.clone(),
                    batch_id: point.batch_id,
                    completed_tasks: point.completed_tasks.len(),
                });
            }
            None => nlog!(
                "Checkpoint for {} has no resumable batch",
                checkpoint.feature_name
            ),
        }
    }

    /// Run every batch in order and return their outcomes.
    ///
    /// With `resume`, an existing checkpoint that covers `specs` is reused
    /// and batches it records as completed are skipped; any other batch is
    /// run again in full. Without one, a fresh checkpoint replaces whatever
    /// was stored.
    ///
    /// # Errors
    /// Fails only if the specs are invalid or a fresh checkpoint cannot be
    /// written. Task failures are reported through the returned results.
    pub async fn execute_all_batches(
        &self,
        specs: &[BatchSpec],
        work: SharedWork,
        resume: bool,
    ) -> Result<Vec<BatchResult>> {
        let started = Instant::now();
        let checkpoint = self.prepare_checkpoint(specs, resume).await?;
        let total_tasks: usize = specs.iter().map(|b| b.tasks.len()).sum();

        nlog!(
            "Execution {} for {} started: {} batches, {} tasks",
            checkpoint.execution_id,
            self.shared.feature_name,
            specs.len(),
            total_tasks
        );
        self.emit(EngineEvent::ExecutionStarted {
            feature_name: self.shared.feature_name.clone(),
            execution_id: checkpoint.execution_id.clone(),
            total_batches: specs.len(),
            total_tasks,
        });

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            if self.is_cancelled() {
                break;
            }
            let done = checkpoint
                .batch(spec.id)
                .is_some_and(|b| b.status == BatchStatus::Completed);
            if resume && done {
                nlog!("Skipping completed batch {} ({})", spec.id, spec.name);
                continue;
            }

            self.wait_if_paused().await;
            if self.is_cancelled() {
                break;
            }

            let result = match spec.batch_type {
                BatchType::Serial => self.execute_batch_serial(spec, &work).await,
                BatchType::Parallel => {
                    self.execute_batch_parallel(spec, &work, self.shared.options.max_parallel)
                        .await
                }
            };
            let stop = self.is_aborted()
                || (result.status == BatchStatus::Failed
                    && self.shared.options.error_strategy == ErrorStrategy::FailFast);
            results.push(result);
            if stop {
                nlog_warn!("Stopping {} after batch {}", self.shared.feature_name, spec.id);
                break;
            }
        }

        let duration = started.elapsed();
        nlog!(
            "Execution {} finished: {} batches run, {} ok, {} failed, cancelled={} in {:?}",
            checkpoint.execution_id,
            results.len(),
            results.iter().map(BatchResult::success_count).sum::<usize>(),
            results.iter().map(BatchResult::failed_count).sum::<usize>(),
            self.interrupted(),
            duration
        );
        self.emit(EngineEvent::ExecutionCompleted {
            feature_name: self.shared.feature_name.clone(),
            cancelled: self.interrupted(),
            duration,
        });
        Ok(results)
    }
}

/// Whether a stored checkpoint holds every batch and task of the plan.
fn covers(checkpoint: &Checkpoint, specs: &[BatchSpec]) -> bool {
    specs.iter().all(|spec| {
        checkpoint.batch(spec.id).is_some()
            && spec.tasks.iter().all(|t| checkpoint.task(&t.id).is_some())
    })
}
