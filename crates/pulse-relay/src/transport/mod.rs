//! Transport adapters: WebSocket, server-push stream, and polling fallback.

pub mod poll;
pub mod protocol;
pub mod socket;
pub mod stream;
