//! Durable notification records and chat messages.
//!
//! [`NotificationRecord`] is the source of truth for "what happened" — live
//! delivery over a transport is only an optimization for "see it now". The
//! wire format is camelCase and matches what the browser clients consume.

use serde::{Deserialize, Serialize};

use crate::ids::{NotificationId, ProjectId, UserId};

/// A persisted notification, as stored and as pushed to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Record identifier.
    pub id: NotificationId,
    /// Owning user.
    pub user_id: UserId,
    /// Notification category (e.g. `"task_assigned"`, `"file_shared"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Short human-readable title.
    pub title: String,
    /// Full message body.
    pub message: String,
    /// Display name of the user that caused the notification, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Whether the owning user has read the notification.
    pub is_read: bool,
    /// Whether the owning user has archived the notification.
    pub archived: bool,
    /// Creation time, epoch milliseconds UTC.
    pub time: i64,
    /// Per-user monotonic sequence number. Reconnecting clients pass the
    /// highest `seq` they have seen as a cursor to fetch only what they
    /// missed.
    pub seq: u64,
}

/// Caller-supplied fields for a notification about to be persisted.
///
/// The store assigns `id`, `time`, `seq` and the initial
/// `is_read = false` / `archived = false` flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNotification {
    /// Owning user.
    pub user_id: UserId,
    /// Notification category.
    pub kind: String,
    /// Short human-readable title.
    pub title: String,
    /// Full message body.
    pub message: String,
    /// Display name of the originating user, if any.
    pub sender: Option<String>,
}

impl NewNotification {
    /// Convenience constructor for the common no-sender case.
    #[must_use]
    pub fn new(
        user_id: impl Into<UserId>,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            sender: None,
        }
    }

    /// Attach the originating user's display name.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}

/// A project chat message relayed to room members.
///
/// Chat durability is owned by the hosting server's message collaborator —
/// the relay only fans the message out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Project the message belongs to.
    pub project_id: ProjectId,
    /// Sending user.
    pub sender: UserId,
    /// Message body.
    pub body: String,
    /// Send time, epoch milliseconds UTC.
    pub timestamp: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NotificationRecord {
        NotificationRecord {
            id: NotificationId::from("n1"),
            user_id: UserId::from("u1"),
            kind: "task_assigned".into(),
            title: "Task".into(),
            message: "You were assigned a task".into(),
            sender: Some("Dana".into()),
            is_read: false,
            archived: false,
            time: 1_700_000_000_000,
            seq: 3,
        }
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["type"], "task_assigned");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["archived"], false);
        assert_eq!(json["seq"], 3);
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn record_omits_null_sender() {
        let mut rec = record();
        rec.sender = None;
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("sender"));
    }

    #[test]
    fn record_serde_roundtrip() {
        let rec = record();
        let json = serde_json::to_string(&rec).unwrap();
        let back: NotificationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn new_notification_defaults() {
        let new = NewNotification::new("u1", "mention", "T", "M");
        assert_eq!(new.user_id.as_str(), "u1");
        assert_eq!(new.kind, "mention");
        assert!(new.sender.is_none());
    }

    #[test]
    fn new_notification_with_sender() {
        let new = NewNotification::new("u1", "mention", "T", "M").with_sender("Ari");
        assert_eq!(new.sender.as_deref(), Some("Ari"));
    }

    #[test]
    fn chat_message_wire_fields() {
        let msg = ChatMessage {
            project_id: ProjectId::from("p1"),
            sender: UserId::from("u2"),
            body: "hello".into(),
            timestamp: 42,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["sender"], "u2");
        assert_eq!(json["body"], "hello");
        assert_eq!(json["timestamp"], 42);
    }
}
