//! Socket wire protocol — inbound client events and outbound frames.
//!
//! Inbound frames are JSON objects tagged by `event`, kebab-case names.
//! Outbound frames are `{"event":"<name>","data":<payload>}` where the
//! event name comes from [`Envelope::socket_event_name`].

use serde::Deserialize;
use serde_json::json;

use pulse_core::{Envelope, ProjectId, RoomId};

/// An event sent by a socket client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join an arbitrary room by canonical name.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// Canonical room id (`user:<id>` / `project:<id>`).
        room: RoomId,
    },
    /// Join the connection owner's own user room.
    JoinUserRoom,
    /// Join a project room (host-side authorization already happened at
    /// the HTTP layer).
    #[serde(rename_all = "camelCase")]
    JoinProject {
        /// Project whose room to join.
        project_id: ProjectId,
    },
    /// Leave a project room.
    #[serde(rename_all = "camelCase")]
    LeaveProject {
        /// Project whose room to leave.
        project_id: ProjectId,
    },
    /// Fan a chat message out to a project room.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        /// Target project room.
        project_id: ProjectId,
        /// Message body, opaque to the relay.
        body: String,
    },
    /// Client keepalive.
    Heartbeat,
}

/// Serialize an envelope as an outbound socket frame.
pub fn socket_frame(envelope: &Envelope) -> serde_json::Result<String> {
    let data = match envelope {
        Envelope::Connected { timestamp } | Envelope::Heartbeat { timestamp } => {
            json!({ "timestamp": timestamp })
        }
        Envelope::Notification { data } => serde_json::to_value(data)?,
        Envelope::Chat { data } => serde_json::to_value(data)?,
        Envelope::Custom { data, .. } => data.clone(),
    };
    serde_json::to_string(&json!({
        "event": envelope.socket_event_name(),
        "data": data,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
