//! CheckpointStore - file-backed persistence for checkpoint documents.
//!
//! Layout: `<dir>/<sanitized feature>/checkpoint.json`. Every write goes to
//! `checkpoint.json.tmp` in the same directory and is renamed over the final
//! path, so readers only ever see a complete document.
//!
//! Every mutation reloads the document, applies one change and rewrites the
//! whole snapshot while holding an in-process mutex. Two separate processes
//! working on the same feature are not coordinated: the last rename wins.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::model::{
    validate_specs, BatchSpec, BatchStatus, Checkpoint, ExecutionSummary, ResumePoint,
    TaskStatus,
};
use crate::{nlog_debug, nlog_error, nlog_warn, Error, Result};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
const TEMP_SUFFIX: &str = "tmp";

/// Map a feature name onto a single safe path component.
pub fn sanitize_feature_name(feature_name: &str) -> String {
    feature_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write `bytes` to `path` through a sibling temp file and an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = temp_path_for(path);
    {
        let mut file = File::create(&temp).map_err(|e| Error::checkpoint_io(&temp, e))?;
        file.write_all(bytes)
            .map_err(|e| Error::checkpoint_io(&temp, e))?;
        file.sync_all().map_err(|e| Error::checkpoint_io(&temp, e))?;
    }
    fs::rename(&temp, path).map_err(|e| Error::checkpoint_io(path, e))?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

/// File-backed store for checkpoint documents, safe to share across tasks
/// of one process.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl CheckpointStore {
    /// Create a store rooted at `dir`. Nothing is touched on disk until the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// The directory holding one sub-directory per feature.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a feature's checkpoint document.
    pub fn checkpoint_path(&self, feature_name: &str) -> PathBuf {
        self.dir
            .join(sanitize_feature_name(feature_name))
            .join(CHECKPOINT_FILE)
    }

    /// Path of the staging file written before the rename.
    pub fn temp_path(&self, feature_name: &str) -> PathBuf {
        temp_path_for(&self.checkpoint_path(feature_name))
    }

    pub fn exists(&self, feature_name: &str) -> bool {
        self.checkpoint_path(feature_name).exists()
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build and persist a fresh checkpoint with every batch and task pending.
    ///
    /// # Errors
    /// Returns a validation error for duplicate batch or task ids, or a
    /// checkpoint IO error if the document cannot be written.
    pub fn create(&self, feature_name: &str, specs: &[BatchSpec]) -> Result<Checkpoint> {
        validate_specs(specs)?;
        let mut checkpoint = Checkpoint::new(feature_name, specs);

        let _guard = self.guard();
        self.write(&mut checkpoint)?;
        nlog_debug!(
            "CheckpointStore::create feature={} execution_id={} batches={}",
            feature_name,
            checkpoint.execution_id,
            checkpoint.total_batches
        );
        Ok(checkpoint)
    }

    /// Load a feature's checkpoint.
    ///
    /// Returns `None` if no document exists or it cannot be parsed; a parse
    /// failure is logged rather than raised.
    pub fn load(&self, feature_name: &str) -> Option<Checkpoint> {
        match self.try_load(feature_name) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                nlog_warn!("Ignoring unreadable checkpoint for {}: {}", feature_name, e);
                None
            }
        }
    }

    /// Like `load`, but surfaces read and parse failures.
    pub fn try_load(&self, feature_name: &str) -> Result<Option<Checkpoint>> {
        Self::read_document(&self.checkpoint_path(feature_name))
    }

    fn read_document(path: &Path) -> Result<Option<Checkpoint>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::checkpoint_io(path, e)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Persist the whole document, refreshing `updated_at` first.
    pub fn save(&self, checkpoint: &mut Checkpoint) -> bool {
        let _guard = self.guard();
        self.persist(checkpoint)
    }

    fn persist(&self, checkpoint: &mut Checkpoint) -> bool {
        match self.write(checkpoint) {
            Ok(()) => true,
            Err(e) => {
                nlog_error!(
                    "Failed to save checkpoint for {}: {}",
                    checkpoint.feature_name,
                    e
                );
                false
            }
        }
    }

    /// Caller must hold the guard.
    fn write(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.updated_at = Utc::now();
        let path = self.checkpoint_path(&checkpoint.feature_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::checkpoint_io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&path, &json)
    }

    /// Load, mutate and rewrite a checkpoint as one exclusive cycle.
    fn mutate<F>(&self, feature_name: &str, apply: F) -> bool
    where
        F: FnOnce(&mut Checkpoint) -> bool,
    {
        let _guard = self.guard();
        let Some(mut checkpoint) = self.load(feature_name) else {
            nlog_warn!("No checkpoint to update for {}", feature_name);
            return false;
        };
        if !apply(&mut checkpoint) {
            return false;
        }
        self.persist(&mut checkpoint)
    }

    /// Record a task transition and rewrite the document.
    ///
    /// Returns false if the checkpoint or task does not exist, or the write
    /// failed.
    pub fn update_task_status(
        &self,
        feature_name: &str,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
        result: Option<&str>,
    ) -> bool {
        nlog_debug!(
            "update_task_status feature={} task={} status={}",
            feature_name,
            task_id,
            status
        );
        self.mutate(feature_name, |cp| {
            let found = cp.apply_task_status(task_id, status, error, result);
            if !found {
                nlog_warn!("Task {} not found in checkpoint {}", task_id, feature_name);
            }
            found
        })
    }

    /// Record a batch transition; entering `InProgress` moves `current_batch`.
    pub fn update_batch_status(
        &self,
        feature_name: &str,
        batch_id: u32,
        status: BatchStatus,
    ) -> bool {
        nlog_debug!(
            "update_batch_status feature={} batch={} status={}",
            feature_name,
            batch_id,
            status
        );
        self.mutate(feature_name, |cp| {
            let found = cp.apply_batch_status(batch_id, status);
            if !found {
                nlog_warn!("Batch {} not found in checkpoint {}", batch_id, feature_name);
            }
            found
        })
    }

    /// Persist the engine's retry counter for a task.
    pub fn set_retry_count(&self, feature_name: &str, task_id: &str, retry_count: u32) -> bool {
        self.mutate(feature_name, |cp| cp.set_retry_count(task_id, retry_count))
    }

    /// First batch still holding work, or `None` when every batch is done
    /// or no checkpoint exists.
    pub fn get_resume_point(&self, feature_name: &str) -> Option<ResumePoint> {
        self.load(feature_name)?.resume_point()
    }

    pub fn get_execution_summary(&self, feature_name: &str) -> Option<ExecutionSummary> {
        Some(self.load(feature_name)?.summary())
    }

    /// Summaries of every readable checkpoint under the store, sorted by
    /// feature name.
    pub fn list_checkpoints(&self) -> Vec<ExecutionSummary> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut summaries: Vec<ExecutionSummary> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().join(CHECKPOINT_FILE))
            .filter(|path| path.is_file())
            .filter_map(|path| match Self::read_document(&path) {
                Ok(Some(cp)) => Some(cp.summary()),
                Ok(None) => None,
                Err(e) => {
                    nlog_warn!("Skipping unreadable checkpoint {}: {}", path.display(), e);
                    None
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.feature_name.cmp(&b.feature_name));
        summaries
    }

    /// Remove a feature's checkpoint and its directory if left empty.
    ///
    /// Deleting a checkpoint that does not exist succeeds.
    pub fn delete(&self, feature_name: &str) -> bool {
        let _guard = self.guard();
        let path = self.checkpoint_path(feature_name);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                nlog_error!("Failed to delete checkpoint {}: {}", path.display(), e);
                return false;
            }
        }
        if let Some(parent) = path.parent() {
            let empty = fs::read_dir(parent)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if empty {
                let _ = fs::remove_dir(parent);
            }
        }
        true
    }
}
