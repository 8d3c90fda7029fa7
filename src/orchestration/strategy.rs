//! Error strategy resolution.
//!
//! When a task attempt fails, the engine asks `resolve` what to do next.
//! Resolution is a pure function of the configured strategy, the retry
//! counters and an optional caller-supplied decision callback.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Configured policy for task failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Retry up to `max_retries` times, then skip.
    Retry,
    /// Skip the failed task and continue.
    Skip,
    /// Stop the whole run on the first failure.
    FailFast,
    /// Defer to the error-decision callback; without one, behave like `Retry`.
    #[default]
    Ask,
}

impl std::fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorStrategy::Retry => write!(f, "retry"),
            ErrorStrategy::Skip => write!(f, "skip"),
            ErrorStrategy::FailFast => write!(f, "fail_fast"),
            ErrorStrategy::Ask => write!(f, "ask"),
        }
    }
}

impl FromStr for ErrorStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "retry" => Ok(ErrorStrategy::Retry),
            "skip" => Ok(ErrorStrategy::Skip),
            "fail_fast" => Ok(ErrorStrategy::FailFast),
            "ask" => Ok(ErrorStrategy::Ask),
            other => Err(Error::Config(format!("unknown error strategy: {other}"))),
        }
    }
}

/// Outcome of resolving a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDecision {
    Retry,
    Skip,
    Abort,
}

/// What the decision callback gets to see about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub task_id: String,
    pub task_name: String,
    pub error: String,
    /// Retries already performed for this task.
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ErrorContext {
    pub fn retries_remaining(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Caller-supplied decision callback for the `Ask` strategy.
pub type DecisionFn = dyn Fn(&ErrorContext) -> ErrorDecision + Send + Sync;

/// Decide how to continue after a failed attempt.
pub fn resolve(
    strategy: ErrorStrategy,
    context: &ErrorContext,
    decider: Option<&DecisionFn>,
) -> ErrorDecision {
    match (strategy, decider) {
        (ErrorStrategy::Skip, _) => ErrorDecision::Skip,
        (ErrorStrategy::FailFast, _) => ErrorDecision::Abort,
        (ErrorStrategy::Ask, Some(decide)) => decide(context),
        (ErrorStrategy::Retry, _) | (ErrorStrategy::Ask, None) => {
            if context.retries_remaining() {
                ErrorDecision::Retry
            } else {
                ErrorDecision::Skip
            }
        }
    }
}

/// True when the retry policy governs this resolution, meaning a `Skip`
/// from `resolve` stands for an exhausted retry budget rather than a
/// deliberate skip.
pub fn retry_policy_applies(strategy: ErrorStrategy, has_decider: bool) -> bool {
    match strategy {
        ErrorStrategy::Retry => true,
        ErrorStrategy::Ask => !has_decider,
        ErrorStrategy::Skip | ErrorStrategy::FailFast => false,
    }
}
