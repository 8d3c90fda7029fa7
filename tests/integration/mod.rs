//! Integration test suite for nexus.
//!
//! These tests drive the engine and the checkpoint store together against
//! a temporary directory, the same way the CLI does.
//!
//! # Test Categories
//!
//! - `resume`: Interrupted runs picking up from the checkpoint
//! - `parallel`: Bounded concurrency and completeness of parallel batches
//! - `failure_policy`: Retry, skip, fail-fast and ask strategies end to end
//! - `persistence`: On-disk checkpoint and audit files
//!
//! # CI Compatibility
//!
//! Work functions are in-process closures, apart from a few `sh -c` tasks,
//! so the suite needs no network or external tools.


mod failure_policy;
mod parallel;
mod persistence;
mod resume;
