use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use conductor_core::{
    AgentFactory, AgentHealthStatus, AgentRef, CancellationToken, HealthLevel,
    DEFAULT_HEALTH_CHECK_TIMEOUT, DEFAULT_HEALTH_FRESHNESS,
};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct CachedHealth {
    status: AgentHealthStatus,
    checked_at: DateTime<Utc>,
}

/// A snapshot of every agent's last known health, for `getHealthReport`.
pub struct HealthReport {
    pub agent_health: HashMap<String, AgentHealthStatus>,
    pub last_updated: DateTime<Utc>,
}

/// The authoritative id -> agent mapping, augmented with cached,
/// periodically-refreshed health status. The registry never blocks
/// dispatch on a slow health check beyond `health_check_timeout`.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRef>>,
    health: RwLock<HashMap<String, CachedHealth>>,
    health_check_timeout: Duration,
    freshness: Duration,
    poll_interval: Duration,
    poll_task: RwLock<Option<JoinHandle<()>>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            health: RwLock::new(HashMap::new()),
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
            freshness: DEFAULT_HEALTH_FRESHNESS,
            poll_interval: DEFAULT_HEALTH_FRESHNESS,
            poll_task: RwLock::new(None),
        }
    }

    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Idempotent per id; a second registration replaces the first binding
    /// without calling `dispose` on it (the caller owns that decision via
    /// `unregister_agent`).
    pub fn register_agent(&self, agent: AgentRef) -> Result<(), String> {
        if agent.id().is_empty() {
            return Err("agent id must not be empty".to_string());
        }
        info!(agent_id = %agent.id(), "registering agent");
        self.agents.write().insert(agent.id().to_string(), agent);
        Ok(())
    }

    pub async fn unregister_agent(&self, id: &str) -> bool {
        let removed = self.agents.write().remove(id);
        self.health.write().remove(id);
        match removed {
            Some(agent) => {
                info!(agent_id = %id, "unregistering agent");
                agent.dispose().await;
                true
            }
            None => false,
        }
    }

    pub fn get_agent(&self, id: &str) -> Option<AgentRef> {
        self.agents.read().get(id).cloned()
    }

    pub fn get_all_agents(&self) -> Vec<AgentRef> {
        self.agents.read().values().cloned().collect()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.agents.read().contains_key(id)
    }

    /// Returns the cached status if it is still fresh; otherwise performs a
    /// bounded health check and caches the result. Returns `None` only when
    /// `id` is not registered.
    pub async fn check_health(&self, id: &str) -> Option<AgentHealthStatus> {
        let agent = self.get_agent(id)?;
        if let Some(cached) = self.fresh_cached(id) {
            return Some(cached);
        }
        Some(self.refresh_health(id, &agent).await)
    }

    fn fresh_cached(&self, id: &str) -> Option<AgentHealthStatus> {
        let health = self.health.read();
        let cached = health.get(id)?;
        let age = Utc::now().signed_duration_since(cached.checked_at);
        if age.to_std().unwrap_or(self.freshness) < self.freshness {
            Some(cached.status.clone())
        } else {
            None
        }
    }

    async fn refresh_health(&self, id: &str, agent: &AgentRef) -> AgentHealthStatus {
        let cancel = CancellationToken::new();
        let status = match tokio::time::timeout(
            self.health_check_timeout,
            agent.check_health(cancel.clone()),
        )
        .await
        {
            Ok(status) => status,
            Err(_) => {
                cancel.cancel();
                warn!(agent_id = %id, "health check timed out");
                AgentHealthStatus::unhealthy(
                    HealthLevel::Unhealthy,
                    format!("health check timed out after {:?}", self.health_check_timeout),
                )
            }
        };
        self.health.write().insert(
            id.to_string(),
            CachedHealth {
                status: status.clone(),
                checked_at: Utc::now(),
            },
        );
        status
    }

    pub async fn get_healthy_agents(&self) -> Vec<AgentRef> {
        let ids: Vec<String> = self.agents.read().keys().cloned().collect();
        let mut healthy = Vec::new();
        for id in ids {
            if let Some(status) = self.check_health(&id).await {
                if status.is_healthy {
                    if let Some(agent) = self.get_agent(&id) {
                        healthy.push(agent);
                    }
                }
            }
        }
        healthy
    }

    pub fn get_health_report(&self) -> HealthReport {
        let health = self.health.read();
        let agent_health = health
            .iter()
            .map(|(id, cached)| (id.clone(), cached.status.clone()))
            .collect();
        let last_updated = health
            .values()
            .map(|c| c.checked_at)
            .max()
            .unwrap_or_else(Utc::now);
        HealthReport {
            agent_health,
            last_updated,
        }
    }

    /// Instantiate each candidate factory and register it, collecting
    /// failures instead of aborting discovery partway through.
    pub fn discover_agents(&self, candidates: &[AgentFactory]) -> Vec<String> {
        let mut errors = Vec::new();
        for factory in candidates {
            let agent = factory();
            if let Err(err) = self.register_agent(agent) {
                errors.push(err);
            }
        }
        errors
    }

    /// Start a background task that re-checks health for every registered
    /// agent on `poll_interval`. Calling this twice replaces the prior task.
    pub fn start_health_polling(self: &Arc<Self>) {
        let registry = self.clone();
        let interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let ids: Vec<String> = registry.agents.read().keys().cloned().collect();
                for id in ids {
                    if let Some(agent) = registry.get_agent(&id) {
                        registry.refresh_health(&id, &agent).await;
                    }
                }
            }
        });
        *self.poll_task.write() = Some(handle);
    }

    pub fn stop_health_polling(&self) {
        if let Some(handle) = self.poll_task.write().take() {
            handle.abort();
        }
    }
}

impl Drop for AgentRegistry {
    fn drop(&mut self) {
        self.stop_health_polling();
    }
}
