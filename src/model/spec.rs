//! Input specifications for a feature run.
//!
//! Callers describe the work as an ordered list of `BatchSpec`s. A plan file
//! on disk is simply a `Plan` serialized as JSON.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Execution mode of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    #[default]
    Serial,
    Parallel,
}

impl std::fmt::Display for BatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchType::Serial => write!(f, "serial"),
            BatchType::Parallel => write!(f, "parallel"),
        }
    }
}

/// One task as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub name: String,
    pub executor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    /// Shell command used by the CLI's work function. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl TaskSpec {
    pub fn new(id: &str, name: &str, executor: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            executor: executor.to_string(),
            output_file: None,
            command: None,
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }
}

/// One batch as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type", default)]
    pub batch_type: BatchType,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl BatchSpec {
    pub fn serial(id: u32, name: &str, tasks: Vec<TaskSpec>) -> Self {
        Self {
            id,
            name: name.to_string(),
            batch_type: BatchType::Serial,
            tasks,
        }
    }

    pub fn parallel(id: u32, name: &str, tasks: Vec<TaskSpec>) -> Self {
        Self {
            id,
            name: name.to_string(),
            batch_type: BatchType::Parallel,
            tasks,
        }
    }
}

/// Check that batch ids and task ids are unique across the whole run.
pub fn validate_specs(batches: &[BatchSpec]) -> Result<()> {
    let mut batch_ids = HashSet::new();
    let mut task_ids = HashSet::new();
    for batch in batches {
        if !batch_ids.insert(batch.id) {
            return Err(Error::Validation(format!(
                "duplicate batch id {}",
                batch.id
            )));
        }
        for task in &batch.tasks {
            if !task_ids.insert(task.id.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate task id {:?} in batch {}",
                    task.id, batch.id
                )));
            }
        }
    }
    Ok(())
}

/// A feature run described on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub feature: String,
    pub batches: Vec<BatchSpec>,
}

impl Plan {
    /// Read and validate a JSON plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let plan: Plan = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        validate_specs(&plan.batches)?;
        Ok(plan)
    }

    pub fn total_tasks(&self) -> usize {
        self.batches.iter().map(|b| b.tasks.len()).sum()
    }
}
