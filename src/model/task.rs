//! Persisted task state.
//!
//! A task is the smallest delegatable unit of work. The checkpoint records
//! its lifecycle status, timing, retry count and the opaque result produced
//! by the external executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::spec::TaskSpec;

/// Task status in its persisted lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started, or reset after a cancelled attempt.
    #[default]
    Pending,
    /// Work has been handed to the executor.
    InProgress,
    /// Work finished successfully.
    Completed,
    /// Work failed and the error strategy gave up on it.
    Failed,
    /// Work failed and the error strategy chose to move on.
    Skipped,
}

impl TaskStatus {
    /// Terminal statuses are exactly the ones that carry an `end_time`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Tasks a resume has to redo.
    pub fn needs_redo(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// State of a single task inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// Identifier, unique within the checkpoint.
    pub task_id: String,
    /// Display name.
    pub name: String,
    /// Opaque executor label, resolved by the caller.
    pub executor: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub result: Option<String>,
}

impl TaskState {
    /// Build a pending task from its spec.
    pub fn from_spec(spec: &TaskSpec) -> Self {
        Self {
            task_id: spec.id.clone(),
            name: spec.name.clone(),
            executor: spec.executor.clone(),
            status: TaskStatus::Pending,
            output_file: spec.output_file.clone(),
            error_message: None,
            start_time: None,
            end_time: None,
            retry_count: 0,
            result: None,
        }
    }

    /// Apply a status transition at `now`.
    ///
    /// Entering `InProgress` stamps `start_time`; any terminal status stamps
    /// `end_time`; going back to `Pending` clears both so the
    /// end-time-iff-terminal invariant holds in every direction. `error` and
    /// `result` overwrite the stored values only when supplied.
    pub fn transition(
        &mut self,
        status: TaskStatus,
        error: Option<&str>,
        result: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        match status {
            TaskStatus::Pending => {
                self.start_time = None;
                self.end_time = None;
            }
            TaskStatus::InProgress => {
                self.start_time = Some(now);
                self.end_time = None;
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped => {
                self.end_time = Some(now);
            }
        }
        if let Some(error) = error {
            self.error_message = Some(error.to_string());
        }
        if let Some(result) = result {
            self.result = Some(result.to_string());
        }
    }

    /// True if applying `(status, error)` would not change anything but
    /// timestamps.
    pub fn already_settled(&self, status: TaskStatus, error: Option<&str>) -> bool {
        status.is_terminal()
            && self.status == status
            && error.map_or(true, |e| self.error_message.as_deref() == Some(e))
    }
}
