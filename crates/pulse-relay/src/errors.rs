//! Relay error taxonomy.
//!
//! Failure policy: durability failures are always surfaced to the caller;
//! live-delivery failures never are. A push failure to one room member is
//! handled inside `publish` (that connection is evicted) and is deliberately
//! absent from this public taxonomy.

use pulse_core::{ConnectionId, NotificationId, RoomId, UserId};
use pulse_store::StoreError;
use thiserror::Error;

/// Errors surfaced by registry, router, and dispatcher operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The referenced connection is no longer registered — it was already
    /// evicted. Callers must stop driving it.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Room membership would violate the ownership invariant. The join is
    /// rejected; the connection is not evicted.
    #[error("forbidden: user {user} may not join {room}")]
    Forbidden {
        /// The room that was refused.
        room: RoomId,
        /// The connection's owning user.
        user: UserId,
    },

    /// The registry is at capacity. The client must retry with backoff.
    #[error("connection registry at capacity ({limit})")]
    ResourceExhausted {
        /// Configured connection limit.
        limit: usize,
    },

    /// The notification does not exist or belongs to another user.
    #[error("notification not found: {0}")]
    NotFound(NotificationId),

    /// The durable write failed; no live publish was attempted.
    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),
}

/// Convenience type alias for relay results.
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Persistence(other),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
