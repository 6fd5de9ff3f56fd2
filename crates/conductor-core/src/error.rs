use std::time::Duration;

use thiserror::Error;

/// The taxonomy of failures the engine can attribute to a step or a workflow.
///
/// Variants map one-to-one onto the error categories the engine reasons
/// about when deciding whether to retry a step. Agent implementations never
/// construct or propagate this type directly -- `Agent::execute` is
/// infallible and reports failure through `AgentResult::error` instead. This
/// enum exists for the engine's own bookkeeping and for the small number of
/// genuinely fallible boundary operations (registry lookups, validation,
/// channel and tool registry operations).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("agent '{0}' not registered")]
    AgentNotRegistered(String),

    #[error("agent '{agent_id}' unhealthy: {message}")]
    AgentUnhealthy { agent_id: String, message: String },

    #[error("agent execution failed: {0}")]
    AgentExecutionFailure(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    OutputValidation(String),

    #[error("scheduler error: {0}")]
    SchedulerError(String),
}

/// Broad classification used by the retry loop and by policy allow/deny lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    AgentNotRegistered,
    AgentUnhealthy,
    AgentExecutionFailure,
    Timeout,
    Cancelled,
    OutputValidation,
    SchedulerError,
}

impl ErrorCategory {
    /// String tag used in `RetryPolicy` allow/deny lists, so policies stay
    /// serializable without depending on this enum's Rust representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "ValidationError",
            ErrorCategory::AgentNotRegistered => "AgentNotRegistered",
            ErrorCategory::AgentUnhealthy => "AgentUnhealthy",
            ErrorCategory::AgentExecutionFailure => "AgentExecutionFailure",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Cancelled => "Cancelled",
            ErrorCategory::OutputValidation => "OutputValidation",
            ErrorCategory::SchedulerError => "SchedulerError",
        }
    }
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Validation(_) => ErrorCategory::Validation,
            EngineError::AgentNotRegistered(_) => ErrorCategory::AgentNotRegistered,
            EngineError::AgentUnhealthy { .. } => ErrorCategory::AgentUnhealthy,
            EngineError::AgentExecutionFailure(_) => ErrorCategory::AgentExecutionFailure,
            EngineError::Timeout(_) => ErrorCategory::Timeout,
            EngineError::Cancelled => ErrorCategory::Cancelled,
            EngineError::OutputValidation(_) => ErrorCategory::OutputValidation,
            EngineError::SchedulerError(_) => ErrorCategory::SchedulerError,
        }
    }

    /// Whether this category is retryable absent any policy override.
    /// Only `AgentExecutionFailure` and `Timeout` are retryable by default.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::AgentExecutionFailure | ErrorCategory::Timeout
        )
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
