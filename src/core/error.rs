use thiserror::Error;

/// Service-level failures of a check invocation
#[derive(Debug, Error)]
pub enum CheckError {
    /// Nothing to run or settings out of range; nothing was executed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to resolve assignment {assignment_id}: {message}")]
    AssignmentLookup { assignment_id: i64, message: String },
}

/// Per-attempt failure of the sandboxed executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    #[error("{0}")]
    RuntimeError(String),
    #[error("timeout")]
    Timeout,
}

impl ExecutionFailure {
    pub fn runtime(message: impl Into<String>) -> Self {
        ExecutionFailure::RuntimeError(message.into())
    }
}
