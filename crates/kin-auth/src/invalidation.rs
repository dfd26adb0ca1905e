//! Process-wide broadcast of forced-logout requests.
//!
//! The API layer publishes on authorization failures; the session manager
//! holds the one subscription that acts on it. Other subscribers are
//! read-only (e.g., a "session expired" toast) since a receiver can only
//! observe reasons.

use kin_core::InvalidationReason;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct InvalidationBus {
    tx: broadcast::Sender<InvalidationReason>,
}

impl InvalidationBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Announce that the current session should be torn down.
    ///
    /// Returns the number of subscribers reached; zero when nobody listens.
    pub fn publish(&self, reason: impl Into<InvalidationReason>) -> usize {
        let reason = reason.into();
        tracing::debug!(%reason, "session invalidation published");
        self.tx.send(reason).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationReason> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}
