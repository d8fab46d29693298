//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique ids for logical connections and physical links
//! - Count live connections so shutdown can wait for them to drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Relaxed ordering is enough; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static LINK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of one logical client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier of one physical TCP link (upstream or downstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    pub fn new() -> Self {
        Self(LINK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Counts live client connections for graceful shutdown.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    count_tx: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { count_tx: Arc::new(tx) }
    }

    /// Record a new connection. The count drops again when the guard is dropped.
    pub fn track(&self, id: ConnectionId) -> ConnectionGuard {
        self.count_tx.send_modify(|count| *count += 1);
        metrics::gauge!("switchyard_connections_active").increment(1.0);
        ConnectionGuard {
            count_tx: Arc::clone(&self.count_tx),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.count_tx.borrow()
    }

    /// Wait until no connections remain, or `timeout` elapses.
    ///
    /// Returns `true` if everything drained in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.count_tx.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|count| *count == 0))
            .await
            .map(|res| res.is_ok())
            .unwrap_or(false)
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one connection counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    count_tx: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count_tx.send_modify(|count| *count = count.saturating_sub(1));
        metrics::gauge!("switchyard_connections_active").decrement(1.0);
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
        assert_ne!(LinkId::new(), LinkId::new());
        assert!(ConnectionId::new().to_string().starts_with("conn-"));
    }

    #[test]
    fn tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track(ConnectionId::new());
        let guard2 = tracker.track(ConnectionId::new());
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);
        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_last_guard() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track(ConnectionId::new());
        assert!(!tracker.wait_idle(Duration::from_millis(20)).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        assert!(tracker.wait_idle(Duration::from_secs(2)).await);
    }
}
