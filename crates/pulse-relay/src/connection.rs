//! Live client connection state.
//!
//! A [`Connection`] is created on transport handshake and owned by the
//! [`ConnectionRegistry`](crate::registry::ConnectionRegistry). Envelopes are
//! handed to it through a bounded channel drained by the transport's write
//! task, which gives each connection FIFO delivery and keeps `publish` from
//! ever blocking on a slow client.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pulse_core::{ConnectionId, Envelope, RoomId, UserId};

/// Which transport a connection speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Persistent bidirectional WebSocket.
    Socket,
    /// Unidirectional server-push event stream.
    Stream,
    /// Degraded request/response polling (never registered).
    Poll,
}

impl TransportKind {
    /// Stable lowercase label for logging and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Stream => "stream",
            Self::Poll => "poll",
        }
    }
}

/// Result of handing an envelope to a connection's send queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued for the transport's write task.
    Delivered,
    /// The buffer was full and the envelope was a disposable heartbeat —
    /// dropped, the next heartbeat supersedes it.
    DroppedHeartbeat,
    /// The buffer was full for a non-disposable envelope. The connection is
    /// stalled and must be evicted.
    Stalled,
    /// The transport's write task is gone; the connection is dead.
    Closed,
}

/// State for one live client connection.
#[derive(Debug)]
pub struct Connection {
    /// Opaque id, generated at accept time.
    pub id: ConnectionId,
    /// Transport this connection speaks.
    pub transport: TransportKind,
    /// Authenticated owning user.
    pub owner: UserId,
    /// Bounded send queue drained by the transport's write task.
    tx: mpsc::Sender<Envelope>,
    /// When the connection was accepted.
    connected_at: Instant,
    /// Last observed heartbeat (any sign of life from the client, or a
    /// successfully emitted keepalive for one-directional streams).
    last_heartbeat: Mutex<Instant>,
    /// Rooms this connection has joined.
    rooms: Mutex<HashSet<RoomId>>,
    /// Cancelled on eviction. A child of the relay shutdown token, so
    /// subsystem shutdown stops the transport tasks too.
    cancel: CancellationToken,
    /// Heartbeats dropped due to a full buffer.
    dropped_heartbeats: AtomicU64,
}

impl Connection {
    /// Create a connection with a fresh id.
    ///
    /// `cancel` should be a child of the relay shutdown token; cancelling it
    /// evicts just this connection, while cancelling the parent drains every
    /// session at once.
    #[must_use]
    pub fn new(
        transport: TransportKind,
        owner: UserId,
        tx: mpsc::Sender<Envelope>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            transport,
            owner,
            tx,
            connected_at: now,
            last_heartbeat: Mutex::new(now),
            rooms: Mutex::new(HashSet::new()),
            cancel,
            dropped_heartbeats: AtomicU64::new(0),
        }
    }

    /// Hand an envelope to the send queue without blocking.
    ///
    /// Drop policy: heartbeats are disposable on a full buffer; anything
    /// else signals a stalled client.
    pub fn push(&self, envelope: Envelope) -> PushOutcome {
        match self.tx.try_send(envelope) {
            Ok(()) => PushOutcome::Delivered,
            Err(TrySendError::Full(env)) => {
                if env.is_disposable() {
                    let _ = self.dropped_heartbeats.fetch_add(1, Ordering::Relaxed);
                    PushOutcome::DroppedHeartbeat
                } else {
                    PushOutcome::Stalled
                }
            }
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    /// Record a heartbeat observation.
    pub fn touch(&self, now: Instant) {
        *self.last_heartbeat.lock() = now;
    }

    /// Whether the last heartbeat is older than `timeout` as of `now`.
    #[must_use]
    pub fn stale(&self, now: Instant, timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(*self.last_heartbeat.lock()) > timeout
    }

    /// Track a joined room. Returns false if already a member (pure set).
    pub fn track_room(&self, room: RoomId) -> bool {
        self.rooms.lock().insert(room)
    }

    /// Untrack a room. Returns false if not a member.
    pub fn untrack_room(&self, room: &RoomId) -> bool {
        self.rooms.lock().remove(room)
    }

    /// Snapshot of the joined rooms.
    #[must_use]
    pub fn rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().iter().cloned().collect()
    }

    /// Token cancelled when the connection is evicted.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the connection's tasks. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Heartbeats dropped because the buffer was full.
    #[must_use]
    pub fn dropped_heartbeats(&self) -> u64 {
        self.dropped_heartbeats.load(Ordering::Relaxed)
    }

    /// Connection age.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
