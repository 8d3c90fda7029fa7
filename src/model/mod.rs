//! Checkpoint data model.
//!
//! The durable shape of a feature run: input specs, per-task and per-batch
//! state, and the checkpoint document that ties them together.

pub mod batch;
pub mod checkpoint;
pub mod spec;
pub mod task;

pub use batch::{BatchState, BatchStatus};
pub use checkpoint::{
    Checkpoint, ErrorLogEntry, ExecutionSummary, ResumePoint, ResumeTask, StatusCounts,
    SummaryProgress,
};
pub use spec::{validate_specs, BatchSpec, BatchType, Plan, TaskSpec};
pub use task::{TaskState, TaskStatus};
