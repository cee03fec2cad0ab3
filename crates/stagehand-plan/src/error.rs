//! Plan error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that abort building or executing a plan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("required action failed: {action}: {message}")]
    RequiredActionFailed { action: String, message: String },

    #[error("{action}: timed out after {timeout:?} waiting for {dependency}")]
    PrecedingTimeout {
        action: String,
        dependency: String,
        timeout: Duration,
    },

    #[error("{operation} constraint on {target} has no action in this plan")]
    UnknownTarget { operation: String, target: String },

    #[error("{action} depends on {dependency}, which has no action in this plan")]
    UnknownDependency { action: String, dependency: String },

    #[error("more than one {operation} action targets {target}")]
    DuplicateTarget { operation: String, target: String },

    #[error("plan cancelled")]
    Cancelled,

    #[error("executor task failed: {0}")]
    Worker(String),
}

pub type PlanResult<T> = Result<T, PlanError>;
