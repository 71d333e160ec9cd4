//! The envelope — the normalized unit of dispatch.
//!
//! The room router hands [`Envelope`] values to transport adapters; each
//! adapter serializes them for its own wire protocol. The payload shapes are
//! fixed per variant and checked at the serialization boundary — no
//! loosely-typed payload maps.
//!
//! Wire forms:
//! - **Event stream (SSE)**: each event is `data: <JSON>\n\n` where control
//!   events serialize flat (`{"type":"heartbeat","timestamp":…}`) and data
//!   events nest their payload (`{"type":"notification","data":{…}}`; the
//!   record's own `type` field rules out flattening).
//! - **WebSocket**: outbound frames are `{"event":"<name>","data":<JSON>}`,
//!   with `new-notification` / `receive-message` names the browser client
//!   listens for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notification::{ChatMessage, NotificationRecord};

/// The unit of dispatch from the room router to a transport adapter.
///
/// Immutable once constructed; not persisted itself (the notification record
/// is the durable counterpart of [`Envelope::Notification`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Sent once, immediately after a transport handshake completes.
    Connected {
        /// Server time at accept, epoch milliseconds UTC.
        timestamp: i64,
    },
    /// Periodic keepalive so intermediaries do not close idle streams.
    Heartbeat {
        /// Server time at emission, epoch milliseconds UTC.
        timestamp: i64,
    },
    /// A persisted notification being pushed live.
    Notification {
        /// The durable record, exactly as persisted.
        data: NotificationRecord,
    },
    /// A project chat message.
    Chat {
        /// The relayed message.
        data: ChatMessage,
    },
    /// Host-defined event with an opaque payload.
    Custom {
        /// Host-chosen event name.
        event: String,
        /// Opaque structured payload.
        data: Value,
    },
}

/// Discriminant of an [`Envelope`], used for drop policy and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// `connected` control event.
    Connected,
    /// `heartbeat` control event.
    Heartbeat,
    /// `notification` data event.
    Notification,
    /// `chat` data event.
    Chat,
    /// Host-defined event.
    Custom,
}

impl EnvelopeKind {
    /// Stable lowercase label for logging and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Heartbeat => "heartbeat",
            Self::Notification => "notification",
            Self::Chat => "chat",
            Self::Custom => "custom",
        }
    }
}

impl Envelope {
    /// Build a `connected` envelope stamped with the current time.
    #[must_use]
    pub fn connected_now() -> Self {
        Self::Connected {
            timestamp: now_millis(),
        }
    }

    /// Build a `heartbeat` envelope stamped with the current time.
    #[must_use]
    pub fn heartbeat_now() -> Self {
        Self::Heartbeat {
            timestamp: now_millis(),
        }
    }

    /// Wrap a persisted record for live push.
    #[must_use]
    pub fn notification(record: NotificationRecord) -> Self {
        Self::Notification { data: record }
    }

    /// Wrap a chat message for fan-out.
    #[must_use]
    pub fn chat(message: ChatMessage) -> Self {
        Self::Chat { data: message }
    }

    /// The envelope's discriminant.
    #[must_use]
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Connected { .. } => EnvelopeKind::Connected,
            Self::Heartbeat { .. } => EnvelopeKind::Heartbeat,
            Self::Notification { .. } => EnvelopeKind::Notification,
            Self::Chat { .. } => EnvelopeKind::Chat,
            Self::Custom { .. } => EnvelopeKind::Custom,
        }
    }

    /// Whether a full send buffer may silently drop this envelope.
    ///
    /// Heartbeats are disposable — the next one supersedes them. Every other
    /// kind must reach the client or the connection is treated as stalled.
    #[must_use]
    pub fn is_disposable(&self) -> bool {
        matches!(self, Self::Heartbeat { .. })
    }

    /// The WebSocket outbound event name for this envelope.
    #[must_use]
    pub fn socket_event_name(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Notification { .. } => "new-notification",
            Self::Chat { .. } => "receive-message",
            Self::Custom { event, .. } => event,
        }
    }
}

/// Current UTC time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
