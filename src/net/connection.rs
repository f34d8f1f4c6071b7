//! Connection identity and bridge-session tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and hook notifications
//! - Count bridge sessions currently splicing bytes
//!
//! # Design Decisions
//! - IDs come from a process-wide counter, never reused
//! - Session counts are informational; shutdown does not wait on them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
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

/// Counts bridge sessions in flight on the hub.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session. The returned guard ends it on drop.
    pub fn track(&self, id: ConnectionId) -> SessionGuard {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        crate::observability::metrics::record_active_bridges(active);
        SessionGuard {
            active: Arc::clone(&self.active),
            id,
        }
    }

    /// Sessions currently bridging.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Guard for one bridge session.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<AtomicU64>,
    id: ConnectionId,
}

impl SessionGuard {
    /// The standby connection this session consumed.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        crate::observability::metrics::record_active_bridges(active);
        tracing::trace!(connection_id = %self.id, "Bridge session closed");
    }
}
