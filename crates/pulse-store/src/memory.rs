//! In-memory notification store.
//!
//! Backs unit and integration tests, and embedders that keep notification
//! durability elsewhere. Same contract as the `SQLite` backend, including
//! per-user monotonic sequence numbers and the ownership rule.

use std::collections::HashMap;

use parking_lot::Mutex;
use pulse_core::{
    envelope::now_millis, NewNotification, NotificationId, NotificationRecord, UserId,
};

use crate::errors::{Result, StoreError};
use crate::store::{ListOptions, NotificationStore};

/// Per-user shelf: the records plus the user's sequence counter.
#[derive(Default)]
struct Shelf {
    next_seq: u64,
    records: Vec<NotificationRecord>,
}

/// Thread-safe in-memory [`NotificationStore`].
#[derive(Default)]
pub struct MemoryNotificationStore {
    shelves: Mutex<HashMap<UserId, Shelf>>,
}

impl MemoryNotificationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all users (test helper).
    #[must_use]
    pub fn len(&self) -> usize {
        self.shelves.lock().values().map(|s| s.records.len()).sum()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationStore for MemoryNotificationStore {
    fn create(&self, new: NewNotification) -> Result<NotificationRecord> {
        let mut shelves = self.shelves.lock();
        let shelf = shelves.entry(new.user_id.clone()).or_default();
        shelf.next_seq += 1;
        let record = NotificationRecord {
            id: NotificationId::new(),
            user_id: new.user_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            sender: new.sender,
            is_read: false,
            archived: false,
            time: now_millis(),
            seq: shelf.next_seq,
        };
        shelf.records.push(record.clone());
        Ok(record)
    }

    fn list(&self, user: &UserId, opts: ListOptions) -> Result<Vec<NotificationRecord>> {
        let shelves = self.shelves.lock();
        let Some(shelf) = shelves.get(user) else {
            return Ok(Vec::new());
        };
        let mut records: Vec<NotificationRecord> = shelf
            .records
            .iter()
            .filter(|r| r.archived == opts.archived)
            .filter(|r| opts.since.is_none_or(|since| r.seq > since))
            .cloned()
            .collect();
        // Newest first; seq breaks ties within the same millisecond.
        records.sort_by(|a, b| b.time.cmp(&a.time).then(b.seq.cmp(&a.seq)));
        Ok(records)
    }

    fn mark_read(&self, id: &NotificationId, user: &UserId) -> Result<()> {
        self.mutate(id, user, |r| r.is_read = true)
    }

    fn set_archived(&self, id: &NotificationId, user: &UserId, archived: bool) -> Result<()> {
        self.mutate(id, user, |r| r.archived = archived)
    }

    fn delete(&self, id: &NotificationId, user: &UserId) -> Result<()> {
        let mut shelves = self.shelves.lock();
        let shelf = shelves
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let before = shelf.records.len();
        shelf.records.retain(|r| &r.id != id);
        if shelf.records.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}

impl MemoryNotificationStore {
    /// Apply `f` to the record owned by `user` with the given id.
    fn mutate(
        &self,
        id: &NotificationId,
        user: &UserId,
        f: impl FnOnce(&mut NotificationRecord),
    ) -> Result<()> {
        let mut shelves = self.shelves.lock();
        let record = shelves
            .get_mut(user)
            .and_then(|shelf| shelf.records.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        f(record);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
