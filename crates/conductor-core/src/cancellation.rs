use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.parent.as_deref().is_some_and(Inner::is_cancelled)
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    fn cancelled(self: &Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            loop {
                if self.is_cancelled() {
                    return;
                }
                match &self.parent {
                    Some(parent) => {
                        tokio::select! {
                            _ = self.notify.notified() => {}
                            _ = parent.cancelled() => {}
                        }
                    }
                    None => self.notify.notified().await,
                }
                if self.is_cancelled() {
                    return;
                }
            }
        })
    }
}

/// A cooperative, composable cancellation primitive.
///
/// Cloning shares the same underlying flag. [`CancellationToken::child_token`]
/// derives a token that observes both its own cancellation and its parent's,
/// without the reverse: cancelling a child never cancels the parent. The
/// workflow engine uses one root token per `executeWorkflow` call, linked to
/// the caller's token and an optional deadline-derived token, and a child
/// token per step.
#[derive(Clone)]
pub struct CancellationToken(Arc<Inner>);

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            parent: None,
        }))
    }

    /// A token that observes this token's cancellation plus its own.
    pub fn child_token(&self) -> Self {
        Self(Arc::new(Inner {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            parent: Some(self.0.clone()),
        }))
    }

    /// Combine several independent tokens into one: cancelling any of the
    /// sources cancels the returned token. Used to link a caller-supplied
    /// cancellation source with an overall workflow deadline.
    pub fn linked(sources: &[CancellationToken]) -> Self {
        let combined = CancellationToken::new();
        for source in sources {
            let combined = combined.clone();
            let source = source.clone();
            tokio::spawn(async move {
                source.cancelled().await;
                combined.cancel();
            });
        }
        combined
    }

    /// A token that cancels itself after `duration` elapses, linked with
    /// `source` so either the deadline or an explicit cancel trips it.
    pub fn with_deadline(source: &CancellationToken, duration: Duration) -> Self {
        let deadline_token = CancellationToken::new();
        {
            let deadline_token = deadline_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                deadline_token.cancel();
            });
        }
        CancellationToken::linked(&[source.clone(), deadline_token])
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}
