//! Engine outcomes, lifecycle events and caller callbacks.
//!
//! Results (`TaskResult`, `BatchResult`) are what the engine returns.
//! `EngineEvent`s are streamed over an unbounded channel to collaborators
//! such as the audit log. `Callbacks` hold the synchronous hooks a hosting
//! program registers on the engine.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::strategy::DecisionFn;
use crate::model::{BatchStatus, BatchType};

/// Terminal outcome of one task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Success,
    Failed,
    Skipped,
    /// Stopped by cancellation; the task is left pending for a resume.
    Cancelled,
    /// The final failed attempt was a timeout. Persisted as failed.
    Timeout,
}

impl ExecutionResult {
    /// Whether this outcome counts against the batch.
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionResult::Failed | ExecutionResult::Timeout)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionResult::Success => write!(f, "success"),
            ExecutionResult::Failed => write!(f, "failed"),
            ExecutionResult::Skipped => write!(f, "skipped"),
            ExecutionResult::Cancelled => write!(f, "cancelled"),
            ExecutionResult::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of a single task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub task_id: String,
    pub task_name: String,
    pub executor: String,
    pub result: ExecutionResult,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
    pub retry_count: u32,
}

/// Result of a batch. `task_results` is in list order for serial batches
/// and completion order for parallel ones.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub batch_id: u32,
    pub batch_name: String,
    pub batch_type: BatchType,
    pub status: BatchStatus,
    pub task_results: Vec<TaskResult>,
    pub duration: Duration,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.count(|r| r == ExecutionResult::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(|r| r.is_failure())
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|r| r == ExecutionResult::Skipped)
    }

    fn count(&self, pred: impl Fn(ExecutionResult) -> bool) -> usize {
        self.task_results.iter().filter(|t| pred(t.result)).count()
    }
}

/// Progress snapshot emitted after each task of a batch settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub batch_id: u32,
    pub completed: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Lifecycle events streamed to collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ExecutionStarted {
        feature_name: String,
        execution_id: String,
        total_batches: usize,
        total_tasks: usize,
    },
    ExecutionCompleted {
        feature_name: String,
        cancelled: bool,
        duration: Duration,
    },
    CheckpointResumed {
        feature_name: String,
        batch_id: u32,
        completed_tasks: usize,
    },
    BatchStarted {
        batch_id: u32,
        batch_name: String,
        batch_type: BatchType,
        task_count: usize,
    },
    BatchCompleted {
        batch_id: u32,
        status: BatchStatus,
        success: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    },
    TaskStarted {
        batch_id: u32,
        task_id: String,
        task_name: String,
        executor: String,
    },
    TaskCompleted {
        batch_id: u32,
        task_id: String,
        executor: String,
        result: ExecutionResult,
        duration: Duration,
    },
    TaskRetry {
        batch_id: u32,
        task_id: String,
        attempt: u32,
        error: String,
    },
    TaskError {
        batch_id: u32,
        task_id: String,
        error: String,
    },
}

impl EngineEvent {
    /// Stable snake_case name used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::ExecutionStarted { .. } => "execution_start",
            EngineEvent::ExecutionCompleted { .. } => "execution_complete",
            EngineEvent::CheckpointResumed { .. } => "checkpoint_resume",
            EngineEvent::BatchStarted { .. } => "batch_start",
            EngineEvent::BatchCompleted { .. } => "batch_complete",
            EngineEvent::TaskStarted { .. } => "task_start",
            EngineEvent::TaskCompleted { .. } => "task_complete",
            EngineEvent::TaskRetry { .. } => "task_retry",
            EngineEvent::TaskError { .. } => "task_error",
        }
    }
}

pub type TaskStartFn = dyn Fn(&str, &str) + Send + Sync;
pub type TaskCompleteFn = dyn Fn(&TaskResult) + Send + Sync;
pub type BatchCompleteFn = dyn Fn(&BatchResult) + Send + Sync;
pub type ProgressFn = dyn Fn(&ProgressUpdate) + Send + Sync;

/// Registered hooks. Every hook is optional.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) task_start: Option<Arc<TaskStartFn>>,
    pub(crate) task_complete: Option<Arc<TaskCompleteFn>>,
    pub(crate) batch_complete: Option<Arc<BatchCompleteFn>>,
    pub(crate) progress_update: Option<Arc<ProgressFn>>,
    pub(crate) error_decision: Option<Arc<DecisionFn>>,
}

impl Callbacks {
    pub(crate) fn task_started(&self, task_id: &str, name: &str) {
        if let Some(cb) = &self.task_start {
            cb(task_id, name);
        }
    }

    pub(crate) fn task_completed(&self, result: &TaskResult) {
        if let Some(cb) = &self.task_complete {
            cb(result);
        }
    }

    pub(crate) fn batch_completed(&self, result: &BatchResult) {
        if let Some(cb) = &self.batch_complete {
            cb(result);
        }
    }

    pub(crate) fn progress(&self, update: &ProgressUpdate) {
        if let Some(cb) = &self.progress_update {
            cb(update);
        }
    }

    pub(crate) fn decider(&self) -> Option<&DecisionFn> {
        self.error_decision.as_deref()
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("task_start", &self.task_start.is_some())
            .field("task_complete", &self.task_complete.is_some())
            .field("batch_complete", &self.batch_complete.is_some())
            .field("progress_update", &self.progress_update.is_some())
            .field("error_decision", &self.error_decision.is_some())
            .finish()
    }
}
