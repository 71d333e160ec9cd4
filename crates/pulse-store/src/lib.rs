//! Durable notification storage.
//!
//! The relay persists a notification **before** attempting live delivery —
//! durability before visibility. This crate defines the
//! [`NotificationStore`] trait the dispatcher writes through, an in-memory
//! implementation for tests and lightweight embedders, and a `SQLite`
//! implementation (r2d2 pool, WAL mode, embedded migration).

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use memory::MemoryNotificationStore;
pub use sqlite::SqliteNotificationStore;
pub use store::{ListOptions, NotificationStore};
