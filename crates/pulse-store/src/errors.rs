//! Error types for the notification store.
//!
//! [`StoreError`] is returned by every [`NotificationStore`](crate::store::NotificationStore)
//! operation. The surface is small enough for exhaustive matching at the
//! dispatcher boundary.

use pulse_core::NotificationId;
use thiserror::Error;

/// Errors that can occur during notification store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// The notification does not exist or is owned by a different user.
    ///
    /// Ownership violations deliberately collapse into `NotFound` — callers
    /// must not be able to probe for other users' notification ids.
    #[error("notification not found: {0}")]
    NotFound(NotificationId),

    /// Internal error (e.g. corrupt row).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
