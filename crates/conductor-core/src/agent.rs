use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::cancellation::CancellationToken;
use crate::error::EngineResult;
use crate::health::AgentHealthStatus;
use crate::request::AgentRequest;
use crate::result::AgentResult;

/// The capability set every agent implements.
///
/// `execute` must never throw: any internal failure is reported through
/// `AgentResult::error`, never a panic or a bubbled-up `Result::Err`. Methods
/// take `&self` rather than `&mut self` so agents can be shared behind an
/// `Arc` across concurrent steps; implementations hold interior-mutable
/// state (see [`BaseAgent`]) for the initialized/disposed flags.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn is_initialized(&self) -> bool;

    /// Idempotent setup. Calling this more than once must not re-run
    /// side-effecting setup.
    async fn initialize(&self, config: serde_json::Value) -> EngineResult<()>;

    /// Process one request. Must return a result even on internal failure.
    async fn execute(&self, request: AgentRequest, cancel: CancellationToken) -> AgentResult;

    /// Report current health. Bounded by a timeout the caller supplies via
    /// `cancel`; the engine does not retry this call.
    async fn check_health(&self, cancel: CancellationToken) -> AgentHealthStatus;

    /// Release resources. After this returns, `execute` must report an
    /// error result rather than attempt work.
    async fn dispose(&self);
}

pub type AgentRef = Arc<dyn Agent>;

/// A factory the host supplies for discovery, replacing reflection-based
/// scanning with an explicit candidate list.
pub type AgentFactory = Arc<dyn Fn() -> AgentRef + Send + Sync>;

/// Common scaffold embedded by concrete agents by composition, not
/// inheritance: it owns identity fields and the initialized/disposed flags
/// so each agent only has to implement its own `execute` behavior.
#[derive(Debug)]
pub struct BaseAgent {
    id: String,
    name: String,
    description: String,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl BaseAgent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns true the first time it is called; subsequent calls are
    /// no-ops, giving callers an idempotence check for free.
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }

    pub fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}
