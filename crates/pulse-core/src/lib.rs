//! Foundation types for the Pulse real-time notification relay.
//!
//! This crate has no I/O: it defines the branded ID newtypes, the room
//! identifier grammar, the durable notification record shape, and the
//! [`Envelope`](envelope::Envelope) sum type passed from the room router to
//! the transport adapters.

pub mod envelope;
pub mod ids;
pub mod notification;
pub mod room;

pub use envelope::{Envelope, EnvelopeKind, now_millis};
pub use ids::{ConnectionId, NotificationId, ProjectId, UserId};
pub use notification::{ChatMessage, NewNotification, NotificationRecord};
pub use room::{ParseRoomError, RoomId};
