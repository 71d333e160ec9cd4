//! Real-time notification fan-out subsystem.
//!
//! Embeds in a hosting axum server: the host authenticates requests,
//! persists domain data, and mounts [`RelayServer::router`]; the relay owns
//! connection lifecycle, room membership, and best-effort live delivery of
//! notifications and chat over WebSocket, server-push streams, and a polling
//! fallback.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod presence;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::RelayConfig;
pub use connection::{Connection, PushOutcome, TransportKind};
pub use dispatcher::NotificationDispatcher;
pub use errors::{RelayError, Result};
pub use presence::PresenceMonitor;
pub use registry::ConnectionRegistry;
pub use router::RoomRouter;
pub use server::{AppState, AuthedUser, RelayServer};
pub use shutdown::ShutdownCoordinator;
