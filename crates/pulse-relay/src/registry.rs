//! Connection registry — owns every live connection.
//!
//! Shared mutable state accessed by one task per connection plus the
//! presence monitor, so all mutation happens under a single `RwLock` with an
//! atomic counter for lock-free size queries. No lock is ever held across an
//! await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pulse_core::{ConnectionId, Envelope, UserId};

use crate::connection::{Connection, TransportKind};
use crate::errors::{RelayError, Result};
use crate::metrics as relay_metrics;

/// Registry of live connections, keyed by connection id.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    capacity: usize,
    active: AtomicUsize,
    shutdown: CancellationToken,
}

impl ConnectionRegistry {
    /// Create a registry with the given capacity.
    ///
    /// Every registered connection gets a child of `shutdown` as its cancel
    /// token, so cancelling it drains every live session.
    #[must_use]
    pub fn new(capacity: usize, shutdown: CancellationToken) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity,
            active: AtomicUsize::new(0),
            shutdown,
        }
    }

    /// Allocate and register a new connection.
    ///
    /// Fails only with [`RelayError::ResourceExhausted`] when the registry
    /// is at capacity; the client must retry with backoff.
    pub fn register(
        &self,
        transport: TransportKind,
        owner: UserId,
        tx: mpsc::Sender<Envelope>,
    ) -> Result<Arc<Connection>> {
        let mut connections = self.connections.write();
        if connections.len() >= self.capacity {
            return Err(RelayError::ResourceExhausted {
                limit: self.capacity,
            });
        }
        let conn = Arc::new(Connection::new(
            transport,
            owner,
            tx,
            self.shutdown.child_token(),
        ));
        let prev = connections.insert(conn.id.clone(), conn.clone());
        debug_assert!(prev.is_none(), "uuid v7 collision");
        let _ = self.active.fetch_add(1, Ordering::Relaxed);
        drop(connections);

        counter!(relay_metrics::RELAY_CONNECTIONS_TOTAL, "transport" => transport.as_str())
            .increment(1);
        gauge!(relay_metrics::RELAY_CONNECTIONS_ACTIVE).increment(1.0);
        debug!(conn_id = %conn.id, owner = %conn.owner, transport = transport.as_str(), "connection registered");
        Ok(conn)
    }

    /// Remove a connection. Idempotent — removing an unknown id is a no-op.
    ///
    /// Returns the removed connection so the router can clean up its room
    /// memberships. The connection's cancel token is cancelled here, which
    /// stops its transport tasks.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.write().remove(id);
        if let Some(conn) = &removed {
            let _ = self.active.fetch_sub(1, Ordering::Relaxed);
            conn.cancel();
            counter!(relay_metrics::RELAY_DISCONNECTIONS_TOTAL).increment(1);
            gauge!(relay_metrics::RELAY_CONNECTIONS_ACTIVE).decrement(1.0);
            debug!(conn_id = %id, "connection unregistered");
        }
        removed
    }

    /// Record a heartbeat for a connection.
    ///
    /// Fails with [`RelayError::UnknownConnection`] when the id is no longer
    /// registered (already evicted) — the caller must stop driving it.
    pub fn touch_heartbeat(&self, id: &ConnectionId, now: Instant) -> Result<()> {
        let connections = self.connections.read();
        let conn = connections
            .get(id)
            .ok_or_else(|| RelayError::UnknownConnection(id.clone()))?;
        conn.touch(now);
        Ok(())
    }

    /// Look up a live connection.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Whether the id is currently registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of live connections (lock-free).
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all live connections, for the presence sweep.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
