//! `SQLite` notification store.
//!
//! Connection pooling via `r2d2` with WAL mode, foreign keys, and a busy
//! timeout applied to every connection. The schema is a single embedded
//! migration tracked in a `schema_version` table; running the migrator is
//! idempotent.
//!
//! Per-user sequence numbers are assigned inside the insert transaction as
//! `max(seq) + 1` for the user, so concurrent creators on different pooled
//! connections can never hand out the same cursor value (the unique
//! `(user_id, seq)` index backstops this).

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use pulse_core::{
    envelope::now_millis, NewNotification, NotificationId, NotificationRecord, UserId,
};

use crate::errors::{Result, StoreError};
use crate::store::{ListOptions, NotificationStore};

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Schema version this build expects.
const SCHEMA_VERSION: u32 = 1;

/// v001 — notifications table, ownership index, per-user sequence index.
const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS notifications (
    id        TEXT PRIMARY KEY,
    user_id   TEXT NOT NULL,
    type      TEXT NOT NULL,
    title     TEXT NOT NULL,
    message   TEXT NOT NULL,
    sender    TEXT,
    is_read   INTEGER NOT NULL DEFAULT 0,
    archived  INTEGER NOT NULL DEFAULT 0,
    time      INTEGER NOT NULL,
    seq       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notifications_user_time
    ON notifications (user_id, archived, time DESC);
CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_user_seq
    ON notifications (user_id, seq);
";

/// `SQLite` pragma customizer that runs on each new pooled connection.
#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 30000;\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
        )
    }
}

/// [`NotificationStore`] backed by a pooled `SQLite` database.
pub struct SqliteNotificationStore {
    pool: ConnectionPool,
}

impl SqliteNotificationStore {
    /// Open (or create) a file-backed store and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(16)
            .connection_timeout(std::time::Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(manager)?;
        let store = Self { pool };
        store.migrate()?;
        info!(path, "sqlite notification store opened");
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    ///
    /// Pool size is pinned to 1: each `:memory:` connection is its own
    /// database, so a larger pool would scatter rows across databases.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(std::time::Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(manager)?;
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Apply the embedded schema if this database is behind.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        )?;
        let current: u32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })?;
        if current >= SCHEMA_VERSION {
            debug!(current, "schema up to date");
            return Ok(());
        }
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(SCHEMA_SQL).map_err(|e| StoreError::Migration {
            message: format!("v{SCHEMA_VERSION:03} failed: {e}"),
        })?;
        let _ = tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        tx.commit()?;
        info!(version = SCHEMA_VERSION, "schema migrated");
        Ok(())
    }
}

/// Map a `notifications` row to a record.
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: NotificationId::from_string(row.get::<_, String>(0)?),
        user_id: UserId::from_string(row.get::<_, String>(1)?),
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        sender: row.get(5)?,
        is_read: row.get::<_, i64>(6)? != 0,
        archived: row.get::<_, i64>(7)? != 0,
        time: row.get(8)?,
        seq: row.get::<_, i64>(9)?.unsigned_abs(),
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, type, title, message, sender, is_read, archived, time, seq";

impl NotificationStore for SqliteNotificationStore {
    fn create(&self, new: NewNotification) -> Result<NotificationRecord> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM notifications WHERE user_id = ?1",
            params![new.user_id.as_str()],
            |row| row.get(0),
        )?;

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
            seq: next_seq.unsigned_abs(),
        };

        let _ = tx.execute(
            "INSERT INTO notifications (id, user_id, type, title, message, sender, is_read, archived, time, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?8)",
            params![
                record.id.as_str(),
                record.user_id.as_str(),
                record.kind,
                record.title,
                record.message,
                record.sender,
                record.time,
                next_seq,
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    fn list(&self, user: &UserId, opts: ListOptions) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM notifications
             WHERE user_id = ?1 AND archived = ?2 AND seq > ?3
             ORDER BY time DESC, seq DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let since = i64::try_from(opts.since.unwrap_or(0)).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![user.as_str(), i64::from(opts.archived), since],
            row_to_record,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn mark_read(&self, id: &NotificationId, user: &UserId) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id.as_str(), user.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn set_archived(&self, id: &NotificationId, user: &UserId, archived: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET archived = ?3 WHERE id = ?1 AND user_id = ?2",
            params![id.as_str(), user.as_str(), i64::from(archived)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn delete(&self, id: &NotificationId, user: &UserId) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
            params![id.as_str(), user.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}

impl SqliteNotificationStore {
    /// Fetch a single record by id regardless of owner (test helper).
    pub fn get_any(&self, id: &NotificationId) -> Result<Option<NotificationRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {SELECT_COLUMNS} FROM notifications WHERE id = ?1");
        let record = conn
            .query_row(&sql, params![id.as_str()], row_to_record)
            .optional()?;
        Ok(record)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
