//! Reusable agent doubles shared across this crate's and `conductor-engine`'s
//! test suites, gated behind `test-support` so they never ship in release
//! builds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::agent::{Agent, BaseAgent};
use crate::cancellation::CancellationToken;
use crate::error::EngineResult;
use crate::health::AgentHealthStatus;
use crate::request::AgentRequest;
use crate::result::AgentResult;

/// Always succeeds, appending a fixed suffix to its input.
pub struct FixedResponseAgent {
    base: BaseAgent,
    suffix: String,
}

impl FixedResponseAgent {
    pub fn new(id: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            base: BaseAgent::new(id, "fixed-response", "returns input + suffix"),
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl Agent for FixedResponseAgent {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    async fn initialize(&self, _config: serde_json::Value) -> EngineResult<()> {
        self.base.mark_initialized();
        Ok(())
    }

    async fn execute(&self, request: AgentRequest, _cancel: CancellationToken) -> AgentResult {
        if self.base.is_disposed() {
            return AgentResult::error(format!("agent '{}' disposed", self.base.id()));
        }
        AgentResult::success(format!("{}{}", request.input, self.suffix))
    }

    async fn check_health(&self, _cancel: CancellationToken) -> AgentHealthStatus {
        AgentHealthStatus::healthy("stub always healthy")
    }

    async fn dispose(&self) {
        self.base.mark_disposed();
    }
}

/// Always fails with a fixed message, counting how many times it was called
/// so tests can assert retry bounds.
pub struct FailingAgent {
    base: BaseAgent,
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingAgent {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            base: BaseAgent::new(id, "failing", "always returns an error"),
            message: message.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for FailingAgent {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    async fn initialize(&self, _config: serde_json::Value) -> EngineResult<()> {
        self.base.mark_initialized();
        Ok(())
    }

    async fn execute(&self, _request: AgentRequest, _cancel: CancellationToken) -> AgentResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AgentResult::error(self.message.clone())
    }

    async fn check_health(&self, _cancel: CancellationToken) -> AgentHealthStatus {
        AgentHealthStatus::healthy("stub always healthy")
    }

    async fn dispose(&self) {
        self.base.mark_disposed();
    }
}

/// Waits on a shared barrier before returning success, letting tests prove
/// several steps ran concurrently rather than one-at-a-time.
pub struct BarrierAgent {
    base: BaseAgent,
    barrier: Arc<Barrier>,
}

impl BarrierAgent {
    pub fn new(id: impl Into<String>, barrier: Arc<Barrier>) -> Self {
        Self {
            base: BaseAgent::new(id, "barrier", "waits on a shared barrier"),
            barrier,
        }
    }
}

#[async_trait]
impl Agent for BarrierAgent {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    async fn initialize(&self, _config: serde_json::Value) -> EngineResult<()> {
        self.base.mark_initialized();
        Ok(())
    }

    async fn execute(&self, request: AgentRequest, _cancel: CancellationToken) -> AgentResult {
        self.barrier.wait().await;
        AgentResult::success(request.input)
    }

    async fn check_health(&self, _cancel: CancellationToken) -> AgentHealthStatus {
        AgentHealthStatus::healthy("stub always healthy")
    }

    async fn dispose(&self) {
        self.base.mark_disposed();
    }
}

/// Sleeps for a configurable duration before succeeding, observing
/// cancellation so cancellation-mid-flight tests can assert promptness.
pub struct SlowAgent {
    base: BaseAgent,
    delay: std::time::Duration,
}

impl SlowAgent {
    pub fn new(id: impl Into<String>, delay: std::time::Duration) -> Self {
        Self {
            base: BaseAgent::new(id, "slow", "sleeps before succeeding"),
            delay,
        }
    }
}

#[async_trait]
impl Agent for SlowAgent {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    async fn initialize(&self, _config: serde_json::Value) -> EngineResult<()> {
        self.base.mark_initialized();
        Ok(())
    }

    async fn execute(&self, request: AgentRequest, cancel: CancellationToken) -> AgentResult {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => AgentResult::success(request.input),
            _ = cancel.cancelled() => AgentResult::error("cancelled"),
        }
    }

    async fn check_health(&self, _cancel: CancellationToken) -> AgentHealthStatus {
        AgentHealthStatus::healthy("stub always healthy")
    }

    async fn dispose(&self) {
        self.base.mark_disposed();
    }
}
