use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    pub from: String,
    pub target: String,
    pub payload: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub success: bool,
    pub payload: Option<String>,
    pub error: Option<String>,
}

impl ChannelResponse {
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: Some(payload.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(message.into()),
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Invoked for every message delivered to a listening channel, synchronous
/// requests and drained fire-and-forget messages alike.
pub type ChannelHandler = Arc<dyn Fn(ChannelMessage) -> BoxFuture<ChannelResponse> + Send + Sync>;

struct ListenerState {
    handler: RwLock<Option<ChannelHandler>>,
    listening: AtomicBool,
    queue_tx: mpsc::UnboundedSender<ChannelMessage>,
}

/// A process-wide router between named endpoints. Each registered id owns a
/// handler slot and a fire-and-forget queue drained by one background task,
/// so messages enqueued by a single sender are delivered in send order
/// while no ordering is promised across distinct senders.
#[derive(Clone, Default)]
pub struct InMemoryChannelRegistry {
    endpoints: Arc<RwLock<HashMap<String, Arc<ListenerState>>>>,
}

impl InMemoryChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as connected and begin draining its fire-and-forget
    /// queue with `handler`. Replaces any prior listener for the same id.
    pub fn start_listening(&self, id: impl Into<String>, handler: ChannelHandler) {
        let id = id.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<ChannelMessage>();
        let state = Arc::new(ListenerState {
            handler: RwLock::new(Some(handler)),
            listening: AtomicBool::new(true),
            queue_tx: tx,
        });
        self.endpoints.write().insert(id.clone(), state.clone());

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if !state.listening.load(Ordering::Acquire) {
                    break;
                }
                let handler = state.handler.read().clone();
                if let Some(handler) = handler {
                    debug!(channel = %message.target, from = %message.from, "draining fire-and-forget message");
                    let _ = handler(message).await;
                }
            }
        });
    }

    pub fn stop_listening(&self, id: &str) {
        if let Some(state) = self.endpoints.read().get(id) {
            state.listening.store(false, Ordering::Release);
            *state.handler.write() = None;
        }
    }

    pub fn disconnect(&self, id: &str) {
        self.stop_listening(id);
        self.endpoints.write().remove(id);
    }

    pub fn is_listening(&self, id: &str) -> bool {
        self.endpoints
            .read()
            .get(id)
            .is_some_and(|s| s.listening.load(Ordering::Acquire))
    }

    /// Synchronous request/response: fails immediately if `target` is not
    /// currently listening.
    pub async fn send_request(&self, request: ChannelMessage) -> ChannelResponse {
        let state = self.endpoints.read().get(&request.target).cloned();
        match state {
            Some(state) if state.listening.load(Ordering::Acquire) => {
                let handler = state.handler.read().clone();
                match handler {
                    Some(handler) => handler(request).await,
                    None => ChannelResponse::error(format!(
                        "channel '{}' has no active handler",
                        request.target
                    )),
                }
            }
            _ => {
                warn!(target = %request.target, "send_request to non-listening channel");
                ChannelResponse::error(format!("channel '{}' is not listening", request.target))
            }
        }
    }

    /// Fire-and-forget: enqueued for the target's background drain task, or
    /// rejected if the target is not currently listening.
    pub fn send(&self, message: ChannelMessage) -> Result<(), String> {
        let state = self.endpoints.read().get(&message.target).cloned();
        match state {
            Some(state) if state.listening.load(Ordering::Acquire) => state
                .queue_tx
                .send(message)
                .map_err(|_| "channel queue closed".to_string()),
            _ => Err(format!("channel '{}' is not listening", message.target)),
        }
    }
}
