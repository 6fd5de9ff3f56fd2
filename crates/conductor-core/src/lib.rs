// Conductor Core - foundation types and traits for the agent orchestration framework
//
// This crate has no opinion about scheduling or retrying anything; it is
// the vocabulary the workflow engine and agents speak: requests, results,
// health status, the agent/tool/channel contracts, and the workflow data
// model.

pub mod agent;
pub mod cancellation;
pub mod channel;
pub mod clock;
pub mod error;
pub mod health;
pub mod request;
pub mod result;
pub mod tool;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use agent::{Agent, AgentFactory, AgentRef, BaseAgent};
pub use cancellation::CancellationToken;
pub use channel::{ChannelHandler, ChannelMessage, ChannelResponse, InMemoryChannelRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use health::{AgentHealthStatus, HealthLevel};
pub use request::AgentRequest;
pub use result::AgentResult;
pub use tool::{
    ParameterDescriptor, ParameterSchema, ParameterType, Tool, ToolFactory, ToolRef, ToolRegistry,
    ToolResult,
};
pub use workflow::{
    ExecutionMode, OutputValidationRule, OutputValidationRuleType, RetryPolicy, RetryStrategy,
    WorkflowDefinition, WorkflowResult, WorkflowStep, WorkflowStepResult,
};

/// Default per-step health-check timeout (see component design §4.1).
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Default per-attempt deadline when a step does not specify its own timeout.
pub const DEFAULT_STEP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Default health-cache freshness bound before the registry re-checks.
pub const DEFAULT_HEALTH_FRESHNESS: std::time::Duration = std::time::Duration::from_secs(30);

/// Default retention window for a completed execution's status.
pub const DEFAULT_STATUS_RETENTION: std::time::Duration = std::time::Duration::from_secs(5 * 60);
