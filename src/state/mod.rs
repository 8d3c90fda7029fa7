//! Checkpoint persistence.
//!
//! One JSON document per feature, rewritten whole on every change.

mod store;

pub use store::{sanitize_feature_name, CheckpointStore, CHECKPOINT_FILE};
