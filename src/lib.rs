//! nexus - checkpoint-backed batch execution.
//!
//! A feature's work is an ordered list of batches, each holding tasks that
//! run serially or with bounded parallelism. Every state change is written to
//! a per-feature checkpoint so an interrupted run can be resumed.

pub mod audit;
pub mod config;
pub mod error;
pub mod log;
pub mod model;
pub mod orchestration;
pub mod progress;
pub mod state;
pub mod util;

pub use model::{BatchSpec, BatchType, Checkpoint, Plan, TaskSpec};
pub use error::{Error, Result};
pub use orchestration::{EngineOptions, ErrorStrategy, ExecutionEngine};
pub use state::CheckpointStore;
