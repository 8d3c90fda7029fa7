//! Persisted batch state and batch status derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::spec::{BatchSpec, BatchType};
use super::task::TaskState;

/// Batch status in its persisted lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    /// Some tasks succeeded and some did not, or the batch was cut short.
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Partial | BatchStatus::Failed
        )
    }

    /// Batches a resume point may land on.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            BatchStatus::Pending | BatchStatus::InProgress | BatchStatus::Partial
        )
    }

    /// Derive the outcome of a finished batch from task outcome counts.
    ///
    /// `reported` is how many tasks produced a terminal result; it is below
    /// `total` when fail-fast stopped the batch early. Skipped tasks count
    /// toward `reported` but neither toward `success` nor `failed`.
    pub fn derive(
        success: usize,
        failed: usize,
        reported: usize,
        total: usize,
        cancelled: bool,
    ) -> Self {
        if cancelled {
            BatchStatus::Partial
        } else if failed == 0 && reported == total {
            BatchStatus::Completed
        } else if success == 0 && failed > 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::InProgress => write!(f, "in_progress"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Partial => write!(f, "partial"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// State of a batch inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchState {
    pub batch_id: u32,
    pub name: String,
    pub batch_type: BatchType,
    pub status: BatchStatus,
    #[serde(default)]
    pub tasks: Vec<TaskState>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl BatchState {
    pub fn from_spec(spec: &BatchSpec) -> Self {
        Self {
            batch_id: spec.id,
            name: spec.name.clone(),
            batch_type: spec.batch_type,
            status: BatchStatus::Pending,
            tasks: spec.tasks.iter().map(TaskState::from_spec).collect(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn transition(&mut self, status: BatchStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            BatchStatus::Pending => {
                self.start_time = None;
                self.end_time = None;
            }
            BatchStatus::InProgress => {
                self.start_time = Some(now);
                self.end_time = None;
            }
            BatchStatus::Completed | BatchStatus::Partial | BatchStatus::Failed => {
                self.end_time = Some(now);
            }
        }
    }
}
