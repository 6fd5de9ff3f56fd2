use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// A monotonic-enough time source for timestamps and deadlines.
///
/// The engine never calls `Utc::now()` directly in scheduling logic so that
/// tests can substitute a [`ManualClock`] and assert ordering invariants
/// without sleeping in real time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Default clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only advances when told to, for deterministic tests.
///
/// Stores milliseconds since epoch in an atomic so it can be shared behind
/// an `Arc` without a lock.
pub struct ManualClock {
    millis_since_epoch: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis_since_epoch: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.millis_since_epoch
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis_since_epoch
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis_since_epoch.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}
