//! Notification dispatcher — the single entry point for announcing events.
//!
//! Persists first, then publishes: a notification becomes durable before any
//! live delivery is attempted, and a failed durable write aborts the call
//! with no phantom live pushes. The publish step is best-effort and never
//! blocks on, or fails because of, any individual client.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use pulse_core::{
    ChatMessage, Envelope, NewNotification, NotificationId, NotificationRecord, RoomId, UserId,
};
use pulse_store::{ListOptions, NotificationStore};

use crate::errors::Result;
use crate::metrics as relay_metrics;
use crate::router::RoomRouter;

/// Dispatches notifications and chat through persistence and the router.
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    router: Arc<RoomRouter>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over the given store and router.
    #[must_use]
    pub fn new(store: Arc<dyn NotificationStore>, router: Arc<RoomRouter>) -> Self {
        Self { store, router }
    }

    /// The router this dispatcher publishes through.
    #[must_use]
    pub fn router(&self) -> &Arc<RoomRouter> {
        &self.router
    }

    /// Announce a notification for a user.
    ///
    /// The record is written to the durable store first; on success it is
    /// pushed to every connection in the user's room. Zero live connections
    /// is not an error — the record remains retrievable via
    /// [`list`](Self::list).
    pub fn notify(&self, new: NewNotification) -> Result<NotificationRecord> {
        let record = self.store.create(new)?;
        counter!(relay_metrics::RELAY_NOTIFICATIONS_TOTAL, "kind" => record.kind.clone())
            .increment(1);

        let room = RoomId::User(record.user_id.clone());
        let handed = self
            .router
            .publish(&room, &Envelope::notification(record.clone()));
        debug!(
            notification_id = %record.id,
            user = %record.user_id,
            seq = record.seq,
            handed,
            "notification dispatched"
        );
        Ok(record)
    }

    /// Fan a chat message out to a project room.
    ///
    /// Chat durability is the hosting server's concern; the relay only
    /// multicasts. Returns the number of connections handed the message.
    pub fn broadcast_chat(&self, message: ChatMessage) -> usize {
        let room = RoomId::Project(message.project_id.clone());
        self.router.publish(&room, &Envelope::chat(message))
    }

    // ── Store pass-throughs for the hosting server's HTTP layer ──────

    /// List a user's notifications, newest first.
    pub fn list(&self, user: &UserId, opts: ListOptions) -> Result<Vec<NotificationRecord>> {
        Ok(self.store.list(user, opts)?)
    }

    /// Mark a notification read, enforcing ownership.
    pub fn mark_read(&self, id: &NotificationId, user: &UserId) -> Result<()> {
        Ok(self.store.mark_read(id, user)?)
    }

    /// Archive or unarchive a notification, enforcing ownership.
    pub fn set_archived(&self, id: &NotificationId, user: &UserId, archived: bool) -> Result<()> {
        Ok(self.store.set_archived(id, user, archived)?)
    }

    /// Delete a notification, enforcing ownership.
    pub fn delete(&self, id: &NotificationId, user: &UserId) -> Result<()> {
        Ok(self.store.delete(id, user)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pulse_core::ProjectId;
    use pulse_store::{MemoryNotificationStore, StoreError};
    use tokio::sync::mpsc;

    use crate::connection::TransportKind;
    use crate::errors::RelayError;
    use crate::registry::ConnectionRegistry;

    /// Store stub whose writes always fail, for the durability-first test.
    struct FailingStore;

    impl NotificationStore for FailingStore {
        fn create(&self, _new: NewNotification) -> pulse_store::Result<NotificationRecord> {
            Err(StoreError::Internal("disk on fire".into()))
        }
        fn list(
            &self,
            _user: &UserId,
            _opts: ListOptions,
        ) -> pulse_store::Result<Vec<NotificationRecord>> {
            Ok(Vec::new())
        }
        fn mark_read(&self, id: &NotificationId, _user: &UserId) -> pulse_store::Result<()> {
            Err(StoreError::NotFound(id.clone()))
        }
        fn set_archived(
            &self,
            id: &NotificationId,
            _user: &UserId,
            _archived: bool,
        ) -> pulse_store::Result<()> {
            Err(StoreError::NotFound(id.clone()))
        }
        fn delete(&self, id: &NotificationId, _user: &UserId) -> pulse_store::Result<()> {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    fn dispatcher_with(store: Arc<dyn NotificationStore>) -> NotificationDispatcher {
        let registry = Arc::new(ConnectionRegistry::new(
            16,
            tokio_util::sync::CancellationToken::new(),
        ));
        let router = Arc::new(RoomRouter::new(registry));
        NotificationDispatcher::new(store, router)
    }

    fn join_user(
        dispatcher: &NotificationDispatcher,
        user: &str,
    ) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(16);
        let conn = dispatcher
            .router()
            .registry()
            .register(TransportKind::Socket, UserId::from(user), tx)
            .unwrap();
        dispatcher
            .router()
            .join(&conn.id, RoomId::user(user))
            .unwrap();
        rx
    }

    #[tokio::test]
    async fn notify_persists_then_publishes() {
        let dispatcher = dispatcher_with(Arc::new(MemoryNotificationStore::new()));
        let mut rx = join_user(&dispatcher, "u1");

        let record = dispatcher
            .notify(NewNotification::new("u1", "task_assigned", "T", "M"))
            .unwrap();
        assert!(!record.is_read);

        match rx.recv().await.unwrap() {
            Envelope::Notification { data } => assert_eq!(data, record),
            other => panic!("expected notification envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn notify_with_no_live_connections_is_ok() {
        let dispatcher = dispatcher_with(Arc::new(MemoryNotificationStore::new()));
        let record = dispatcher
            .notify(NewNotification::new("u1", "task_assigned", "T", "M"))
            .unwrap();
        // Still retrievable via the list API.
        let listed = dispatcher
            .list(&UserId::from("u1"), ListOptions::default())
            .unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[tokio::test]
    async fn persistence_failure_aborts_without_publish() {
        let dispatcher = dispatcher_with(Arc::new(FailingStore));
        let mut rx = join_user(&dispatcher, "u1");

        let err = dispatcher
            .notify(NewNotification::new("u1", "task_assigned", "T", "M"))
            .unwrap_err();
        assert_matches!(err, RelayError::Persistence(_));
        assert!(
            rx.try_recv().is_err(),
            "no phantom live notification without a durable record"
        );
    }

    #[tokio::test]
    async fn sequential_notifies_arrive_in_order() {
        let dispatcher = dispatcher_with(Arc::new(MemoryNotificationStore::new()));
        let mut rx = join_user(&dispatcher, "u1");

        for title in ["a", "b", "c"] {
            let _ = dispatcher
                .notify(NewNotification::new("u1", "mention", title, "m"))
                .unwrap();
        }
        for expected in ["a", "b", "c"] {
            match rx.recv().await.unwrap() {
                Envelope::Notification { data } => assert_eq!(data.title, expected),
                other => panic!("unexpected envelope {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn both_transports_of_same_user_receive_each_notify_once() {
        let dispatcher = dispatcher_with(Arc::new(MemoryNotificationStore::new()));
        let mut socket_rx = join_user(&dispatcher, "u1");
        let mut stream_rx = join_user(&dispatcher, "u1");

        let _ = dispatcher
            .notify(NewNotification::new("u1", "mention", "T", "M"))
            .unwrap();

        assert!(socket_rx.try_recv().is_ok());
        assert!(stream_rx.try_recv().is_ok());
        assert!(socket_rx.try_recv().is_err(), "exactly once per connection");
        assert!(stream_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_chat_reaches_project_room() {
        let dispatcher = dispatcher_with(Arc::new(MemoryNotificationStore::new()));
        let (tx, mut rx) = mpsc::channel(16);
        let conn = dispatcher
            .router()
            .registry()
            .register(TransportKind::Socket, UserId::from("u1"), tx)
            .unwrap();
        dispatcher
            .router()
            .join(&conn.id, RoomId::project("p1"))
            .unwrap();

        let handed = dispatcher.broadcast_chat(ChatMessage {
            project_id: ProjectId::from("p1"),
            sender: UserId::from("u2"),
            body: "hello".into(),
            timestamp: 1,
        });
        assert_eq!(handed, 1);
        assert_matches!(rx.try_recv().unwrap(), Envelope::Chat { .. });
    }

    #[tokio::test]
    async fn mark_read_not_owned_reports_not_found() {
        let dispatcher = dispatcher_with(Arc::new(MemoryNotificationStore::new()));
        let record = dispatcher
            .notify(NewNotification::new("u1", "mention", "T", "M"))
            .unwrap();
        let err = dispatcher
            .mark_read(&record.id, &UserId::from("u2"))
            .unwrap_err();
        assert_matches!(err, RelayError::NotFound(_));
        // Unchanged for the real owner.
        let listed = dispatcher
            .list(&UserId::from("u1"), ListOptions::default())
            .unwrap();
        assert!(!listed[0].is_read);
    }

    #[tokio::test]
    async fn notified_records_list_newest_first_with_seq() {
        let dispatcher = dispatcher_with(Arc::new(MemoryNotificationStore::new()));
        for title in ["a", "b"] {
            let _ = dispatcher
                .notify(NewNotification::new("u1", "mention", title, "m"))
                .unwrap();
        }
        let listed = dispatcher
            .list(&UserId::from("u1"), ListOptions::default())
            .unwrap();
        assert_eq!(listed[0].title, "b");
        assert_eq!(listed[0].seq, 2);
        assert_eq!(listed[1].seq, 1);
    }
}
