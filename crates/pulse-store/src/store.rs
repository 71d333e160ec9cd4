//! The [`NotificationStore`] trait — the dispatcher's persistence seam.
//!
//! All methods are synchronous; callers on async tasks wrap slow backends in
//! `spawn_blocking` at the HTTP layer. Every mutation takes the calling
//! user's id and enforces ownership inside the store: operating on another
//! user's notification reports [`StoreError::NotFound`](crate::StoreError::NotFound),
//! never a different error that would confirm the id exists.

use pulse_core::{NewNotification, NotificationId, NotificationRecord, UserId};

use crate::errors::Result;

/// Filters for listing a user's notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListOptions {
    /// When true, return archived records instead of active ones.
    pub archived: bool,
    /// Exclusive per-user sequence cursor: only records with `seq > since`
    /// are returned. Reconnecting clients use this to fetch exactly what
    /// they missed while disconnected.
    pub since: Option<u64>,
}

/// Durable storage for notification records.
///
/// The store is the source of truth for "what happened"; live delivery is an
/// optimization layered on top. Implementations must assign `id`, `time`,
/// and a per-user monotonic `seq` at create time.
pub trait NotificationStore: Send + Sync {
    /// Persist a new notification. Assigns `id`, `time`, `seq`, and the
    /// initial `is_read = false` / `archived = false` flags.
    fn create(&self, new: NewNotification) -> Result<NotificationRecord>;

    /// List a user's notifications, newest first.
    fn list(&self, user: &UserId, opts: ListOptions) -> Result<Vec<NotificationRecord>>;

    /// Mark a notification read. Fails with `NotFound` when the id does not
    /// exist or belongs to another user.
    fn mark_read(&self, id: &NotificationId, user: &UserId) -> Result<()>;

    /// Archive or unarchive a notification. Same ownership rule as
    /// [`mark_read`](Self::mark_read).
    fn set_archived(&self, id: &NotificationId, user: &UserId, archived: bool) -> Result<()>;

    /// Delete a notification. Same ownership rule as
    /// [`mark_read`](Self::mark_read).
    fn delete(&self, id: &NotificationId, user: &UserId) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
