//! The checkpoint document: one feature run's complete persisted state.
//!
//! All mutation helpers here are pure in-memory operations; persistence and
//! mutual exclusion live in `state::CheckpointStore`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::{BatchState, BatchStatus};
use super::spec::BatchSpec;
use super::task::{TaskState, TaskStatus};

pub const CHECKPOINT_VERSION: &str = "1.0.0";

/// Opaque identifier for one engine run; first 8 hex chars of a UUID v4.
pub fn new_execution_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// One entry in the append-only error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub task_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Complete execution checkpoint for a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub feature_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Id of the batch that most recently entered `in_progress` (0 before any).
    #[serde(default)]
    pub current_batch: u32,
    #[serde(default)]
    pub total_batches: usize,
    #[serde(default)]
    pub batches: Vec<BatchState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub execution_id: String,
    /// Opaque caller configuration carried alongside the run.
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub error_log: Vec<ErrorLogEntry>,
}

fn default_version() -> String {
    CHECKPOINT_VERSION.to_string()
}

/// Where a resumed run should pick up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub batch_id: u32,
    pub batch_name: String,
    /// Pending or failed tasks, in batch order.
    pub incomplete_tasks: Vec<ResumeTask>,
    /// Ids of tasks already completed.
    pub completed_tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeTask {
    pub id: String,
    pub name: String,
    pub executor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryProgress {
    /// `"completed/total"` batches.
    pub batches: String,
    /// `"completed/total"` tasks.
    pub tasks: String,
    /// Completed tasks as a percentage, one decimal.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub in_progress: usize,
}

/// Read-only aggregation used for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub feature_name: String,
    pub execution_id: String,
    pub current_batch: u32,
    pub progress: SummaryProgress,
    pub status: StatusCounts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub has_errors: bool,
    pub error_count: usize,
}

impl Checkpoint {
    /// Build a fresh checkpoint with every batch and task pending.
    pub fn new(feature_name: &str, specs: &[BatchSpec]) -> Self {
        let now = Utc::now();
        let batches: Vec<BatchState> = specs.iter().map(BatchState::from_spec).collect();
        Self {
            feature_name: feature_name.to_string(),
            version: default_version(),
            current_batch: 0,
            total_batches: batches.len(),
            batches,
            created_at: now,
            updated_at: now,
            execution_id: new_execution_id(),
            config: serde_json::Value::Object(Default::default()),
            error_log: Vec::new(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskState> {
        self.batches
            .iter()
            .flat_map(|b| b.tasks.iter())
            .find(|t| t.task_id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskState> {
        self.batches
            .iter_mut()
            .flat_map(|b| b.tasks.iter_mut())
            .find(|t| t.task_id == task_id)
    }

    pub fn batch(&self, batch_id: u32) -> Option<&BatchState> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }

    /// Apply a task transition. Returns false if the task is unknown.
    ///
    /// Repeating a terminal update that is already in effect does not append
    /// a second error-log entry, so identical updates are idempotent apart
    /// from timestamps.
    pub fn apply_task_status(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
        result: Option<&str>,
    ) -> bool {
        let now = Utc::now();
        let Some(task) = self.task_mut(task_id) else {
            return false;
        };
        let repeat = task.already_settled(status, error);
        task.transition(status, error, result, now);

        if let (Some(error), false) = (error, repeat) {
            self.error_log.push(ErrorLogEntry {
                task_id: task_id.to_string(),
                error: error.to_string(),
                timestamp: now,
            });
        }
        true
    }

    /// Apply a batch transition. Returns false if the batch is unknown.
    pub fn apply_batch_status(&mut self, batch_id: u32, status: BatchStatus) -> bool {
        let now = Utc::now();
        let Some(batch) = self.batches.iter_mut().find(|b| b.batch_id == batch_id) else {
            return false;
        };
        batch.transition(status, now);
        if status == BatchStatus::InProgress {
            self.current_batch = batch_id;
        }
        true
    }

    pub fn set_retry_count(&mut self, task_id: &str, retry_count: u32) -> bool {
        match self.task_mut(task_id) {
            Some(task) => {
                task.retry_count = retry_count;
                true
            }
            None => false,
        }
    }

    /// First batch (in list order) that still has work, with its task split.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        let batch = self.batches.iter().find(|b| b.status.is_resumable())?;
        Some(ResumePoint {
            batch_id: batch.batch_id,
            batch_name: batch.name.clone(),
            incomplete_tasks: batch
                .tasks
                .iter()
                .filter(|t| t.status.needs_redo())
                .map(|t| ResumeTask {
                    id: t.task_id.clone(),
                    name: t.name.clone(),
                    executor: t.executor.clone(),
                })
                .collect(),
            completed_tasks: batch
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.task_id.clone())
                .collect(),
        })
    }

    pub fn summary(&self) -> ExecutionSummary {
        let mut counts = StatusCounts::default();
        let mut total = 0usize;
        for task in self.batches.iter().flat_map(|b| b.tasks.iter()) {
            total += 1;
            match task.status {
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Skipped => counts.skipped += 1,
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
            }
        }
        let completed_batches = self
            .batches
            .iter()
            .filter(|b| b.status == BatchStatus::Completed)
            .count();
        let percentage = if total > 0 {
            (counts.completed as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        ExecutionSummary {
            feature_name: self.feature_name.clone(),
            execution_id: self.execution_id.clone(),
            current_batch: self.current_batch,
            progress: SummaryProgress {
                batches: format!("{}/{}", completed_batches, self.batches.len()),
                tasks: format!("{}/{}", counts.completed, total),
                percentage,
            },
            status: counts,
            created_at: self.created_at,
            updated_at: self.updated_at,
            has_errors: !self.error_log.is_empty(),
            error_count: self.error_log.len(),
        }
    }
}
