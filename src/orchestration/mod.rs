//! Batch orchestration.
//!
//! The `ExecutionEngine` runs a feature's batches, serially or with bounded
//! parallelism, applying the configured error strategy to failed tasks and
//! persisting every transition through the checkpoint store.

mod engine;
pub mod events;
pub mod strategy;
pub mod work;

pub use engine::{EngineOptions, EngineStatus, ExecutionEngine};
pub use events::{
    BatchResult, Callbacks, EngineEvent, ExecutionResult, ProgressUpdate, TaskResult,
};
pub use strategy::{resolve, ErrorContext, ErrorDecision, ErrorStrategy};
pub use work::{shared, SharedWork, ShellWork, TaskContext, Work};
