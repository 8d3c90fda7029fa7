//! JSONL audit trail of engine events.
//!
//! One file per run at `<log_dir>/<feature>/<execution_id>_audit.jsonl`.
//! The file is opened when `ExecutionStarted` names the execution id;
//! anything recorded earlier is buffered until then.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::orchestration::{EngineEvent, ExecutionResult};
use crate::state::sanitize_feature_name;
use crate::{nlog_debug, nlog_error, Result};

/// One line of the audit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AuditRecord {
    fn new(event_type: &str, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            message,
            feature_name: None,
            batch_id: None,
            task_id: None,
            executor: None,
            duration_ms: None,
            status: None,
        }
    }
}

/// Running counters over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub cancelled_tasks: usize,
    pub retried_tasks: usize,
    pub executor_calls: BTreeMap<String, usize>,
    pub total_duration_ms: u64,
}

#[derive(Debug)]
pub struct AuditLog {
    log_dir: PathBuf,
    feature_name: String,
    path: Option<PathBuf>,
    file: Option<File>,
    pending: Vec<AuditRecord>,
    stats: AuditStats,
}

impl AuditLog {
    pub fn new(log_dir: impl Into<PathBuf>, feature_name: &str) -> Self {
        Self {
            log_dir: log_dir.into(),
            feature_name: feature_name.to_string(),
            path: None,
            file: None,
            pending: Vec::new(),
            stats: AuditStats::default(),
        }
    }

    pub fn path_for(log_dir: &Path, feature_name: &str, execution_id: &str) -> PathBuf {
        log_dir
            .join(sanitize_feature_name(feature_name))
            .join(format!("{execution_id}_audit.jsonl"))
    }

    /// Path of the audit file, once the execution id is known.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn stats(&self) -> &AuditStats {
        &self.stats
    }

    fn open(&mut self, execution_id: &str) -> Result<()> {
        let path = Self::path_for(&self.log_dir, &self.feature_name, execution_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for record in self.pending.drain(..) {
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
        nlog_debug!("Audit log opened at {}", path.display());
        self.file = Some(file);
        self.path = Some(path);
        Ok(())
    }

    /// Update counters for `event` and append it to the file.
    pub fn record(&mut self, event: &EngineEvent) -> Result<()> {
        if let EngineEvent::ExecutionStarted { execution_id, .. } = event {
            if self.file.is_none() {
                self.open(execution_id)?;
            }
        }

        self.count(event);
        let mut record = self.describe(event);
        record.feature_name.get_or_insert_with(|| self.feature_name.clone());

        match self.file.as_mut() {
            Some(file) => {
                writeln!(file, "{}", serde_json::to_string(&record)?)?;
                file.flush()?;
            }
            None => self.pending.push(record),
        }
        Ok(())
    }

    fn count(&mut self, event: &EngineEvent) {
        let stats = &mut self.stats;
        match event {
            EngineEvent::ExecutionStarted { total_tasks, .. } => stats.total_tasks = *total_tasks,
            EngineEvent::ExecutionCompleted { duration, .. } => {
                stats.total_duration_ms = duration.as_millis() as u64;
            }
            EngineEvent::TaskStarted { executor, .. } => {
                *stats.executor_calls.entry(executor.clone()).or_default() += 1;
            }
            EngineEvent::TaskCompleted { result, .. } => match result {
                ExecutionResult::Success => stats.completed_tasks += 1,
                ExecutionResult::Failed | ExecutionResult::Timeout => stats.failed_tasks += 1,
                ExecutionResult::Skipped => stats.skipped_tasks += 1,
                ExecutionResult::Cancelled => stats.cancelled_tasks += 1,
            },
            EngineEvent::TaskRetry { .. } => stats.retried_tasks += 1,
            EngineEvent::CheckpointResumed { .. }
            | EngineEvent::BatchStarted { .. }
            | EngineEvent::BatchCompleted { .. }
            | EngineEvent::TaskError { .. } => {}
        }
    }

    fn describe(&self, event: &EngineEvent) -> AuditRecord {
        let kind = event.kind();
        match event {
            EngineEvent::ExecutionStarted {
                feature_name,
                execution_id,
                total_batches,
                total_tasks,
            } => AuditRecord {
                feature_name: Some(feature_name.clone()),
                ..AuditRecord::new(
                    kind,
                    format!(
                        "Starting execution {execution_id}: \
                         {total_batches} batches, {total_tasks} tasks"
                    ),
                )
            },
            EngineEvent::ExecutionCompleted {
                feature_name,
                cancelled,
                duration,
            } => {
                let status = if *cancelled { "cancelled" } else { "finished" };
                AuditRecord {
                    feature_name: Some(feature_name.clone()),
                    duration_ms: Some(duration.as_millis() as u64),
                    status: Some(status.to_string()),
                    ..AuditRecord::new(kind, format!("Execution {status}"))
                }
            }
            EngineEvent::CheckpointResumed {
                feature_name,
                batch_id,
                completed_tasks,
            } => AuditRecord {
                feature_name: Some(feature_name.clone()),
                batch_id: Some(*batch_id),
                ..AuditRecord::new(
                    kind,
                    format!("Resuming at batch {batch_id} with {completed_tasks} tasks done"),
                )
            },
            EngineEvent::BatchStarted {
                batch_id,
                batch_name,
                batch_type,
                task_count,
            } => AuditRecord {
                batch_id: Some(*batch_id),
                ..AuditRecord::new(
                    kind,
                    format!("Starting {batch_type} batch {batch_name} ({task_count} tasks)"),
                )
            },
            EngineEvent::BatchCompleted {
                batch_id,
                status,
                success,
                failed,
                skipped,
                duration,
            } => AuditRecord {
                batch_id: Some(*batch_id),
                duration_ms: Some(duration.as_millis() as u64),
                status: Some(status.to_string()),
                ..AuditRecord::new(
                    kind,
                    format!("Batch {batch_id}: {success} ok, {failed} failed, {skipped} skipped"),
                )
            },
            EngineEvent::TaskStarted {
                batch_id,
                task_id,
                task_name,
                executor,
            } => AuditRecord {
                batch_id: Some(*batch_id),
                task_id: Some(task_id.clone()),
                executor: Some(executor.clone()),
                ..AuditRecord::new(kind, format!("Starting task: {task_name}"))
            },
            EngineEvent::TaskCompleted {
                batch_id,
                task_id,
                executor,
                result,
                duration,
            } => AuditRecord {
                batch_id: Some(*batch_id),
                task_id: Some(task_id.clone()),
                executor: Some(executor.clone()),
                duration_ms: Some(duration.as_millis() as u64),
                status: Some(result.to_string()),
                ..AuditRecord::new(kind, format!("Task {task_id}: {result}"))
            },
            EngineEvent::TaskRetry {
                batch_id,
                task_id,
                attempt,
                error,
            } => AuditRecord {
                batch_id: Some(*batch_id),
                task_id: Some(task_id.clone()),
                ..AuditRecord::new(kind, format!("Attempt {attempt} after: {error}"))
            },
            EngineEvent::TaskError {
                batch_id,
                task_id,
                error,
            } => AuditRecord {
                batch_id: Some(*batch_id),
                task_id: Some(task_id.clone()),
                ..AuditRecord::new(kind, error.clone())
            },
        }
    }

    /// Consume events on the blocking pool until every sender is dropped,
    /// then return the final counters.
    pub fn spawn(mut self, mut rx: mpsc::UnboundedReceiver<EngineEvent>) -> JoinHandle<AuditStats> {
        tokio::task::spawn_blocking(move || {
            while let Some(event) = rx.blocking_recv() {
                if let Err(e) = self.record(&event) {
                    nlog_error!("Failed to write audit record: {}", e);
                }
            }
            self.stats
        })
    }

    /// Read every record of an audit file.
    pub fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}
