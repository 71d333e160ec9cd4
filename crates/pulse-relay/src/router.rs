//! Room router — multicast dispatch to room members.
//!
//! Maps each room to the set of member connection ids and fans envelopes out
//! to members' send queues. Delivery is best-effort: a dead or stalled
//! member is evicted without disturbing its siblings, and `publish` never
//! blocks beyond enqueueing (membership is snapshotted under the read lock,
//! the lock is released, and every push is a non-blocking `try_send`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, warn};

use pulse_core::{ConnectionId, Envelope, RoomId};

use crate::connection::PushOutcome;
use crate::errors::{RelayError, Result};
use crate::metrics as relay_metrics;
use crate::registry::ConnectionRegistry;

/// Routes envelopes to the connections joined to a room.
pub struct RoomRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl RoomRouter {
    /// Create a router over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// The registry this router delivers through.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Join a connection to a room.
    ///
    /// Rooms are created lazily on first join. Joining a `user:<id>` room
    /// whose id is not the connection's owner fails with
    /// [`RelayError::Forbidden`] — the join is rejected, the connection
    /// stays alive. Project-room authorization is the hosting server's
    /// responsibility and has already happened by the time this is called.
    pub fn join(&self, id: &ConnectionId, room: RoomId) -> Result<()> {
        let conn = self
            .registry
            .get(id)
            .ok_or_else(|| RelayError::UnknownConnection(id.clone()))?;

        if let RoomId::User(user) = &room {
            if user != &conn.owner {
                return Err(RelayError::Forbidden {
                    room,
                    user: conn.owner.clone(),
                });
            }
        }

        let inserted = {
            let mut rooms = self.rooms.write();
            rooms.entry(room.clone()).or_default().insert(id.clone())
        };
        if inserted {
            let _ = conn.track_room(room.clone());
            debug!(conn_id = %id, room = %room, "joined room");
        }
        Ok(())
    }

    /// Remove a connection from a room. Unknown rooms or non-members are a
    /// no-op. Empty rooms are destroyed.
    pub fn leave(&self, id: &ConnectionId, room: &RoomId) {
        let mut rooms = self.rooms.write();
        if let Some(members) = rooms.get_mut(room) {
            let _ = members.remove(id);
            if members.is_empty() {
                let _ = rooms.remove(room);
            }
        }
        drop(rooms);
        if let Some(conn) = self.registry.get(id) {
            let _ = conn.untrack_room(room);
        }
    }

    /// Multicast an envelope to every member of a room.
    ///
    /// Returns the number of connections the envelope was handed to — not a
    /// guarantee of client-side receipt. Push failures are isolated per
    /// member: a stalled or dead connection is evicted and the remaining
    /// members still receive the envelope.
    pub fn publish(&self, room: &RoomId, envelope: &Envelope) -> usize {
        // Snapshot membership, then release the lock before pushing.
        let members: Vec<ConnectionId> = {
            let rooms = self.rooms.read();
            match rooms.get(room) {
                Some(members) => members.iter().cloned().collect(),
                None => return 0,
            }
        };

        let mut handed = 0;
        let mut orphans: Vec<ConnectionId> = Vec::new();
        for member in &members {
            let Some(conn) = self.registry.get(member) else {
                // Membership can outlive the registry entry when an eviction
                // raced a join before the room was tracked; heal it below.
                orphans.push(member.clone());
                continue;
            };
            match conn.push(envelope.clone()) {
                PushOutcome::Delivered => handed += 1,
                PushOutcome::DroppedHeartbeat => {
                    counter!(relay_metrics::RELAY_HEARTBEAT_DROPS_TOTAL).increment(1);
                }
                PushOutcome::Stalled => {
                    warn!(conn_id = %member, room = %room, "send buffer full for non-heartbeat envelope, evicting stalled connection");
                    self.evict_with_reason(member, "stalled");
                }
                PushOutcome::Closed => {
                    debug!(conn_id = %member, room = %room, "push to closed connection, evicting");
                    self.evict_with_reason(member, "closed");
                }
            }
        }

        if !orphans.is_empty() {
            let mut rooms = self.rooms.write();
            if let Some(current) = rooms.get_mut(room) {
                for orphan in &orphans {
                    let _ = current.remove(orphan);
                }
                if current.is_empty() {
                    let _ = rooms.remove(room);
                }
            }
            drop(rooms);
            debug!(room = %room, pruned = orphans.len(), "pruned unregistered room members");
        }

        counter!(
            relay_metrics::RELAY_PUBLISH_HANDED_TOTAL,
            "kind" => envelope.kind().as_str()
        )
        .increment(handed as u64);
        debug!(room = %room, kind = envelope.kind().as_str(), handed, "published envelope");
        handed
    }

    /// Evict a connection: unregister it and clean up all its memberships.
    ///
    /// Safe to call concurrently with an in-flight `publish` targeting the
    /// same connection (the push no-ops once the registry entry is gone)
    /// and idempotent like `unregister`.
    pub fn evict(&self, id: &ConnectionId) {
        self.evict_with_reason(id, "closed");
    }

    pub(crate) fn evict_with_reason(&self, id: &ConnectionId, reason: &'static str) {
        let Some(conn) = self.registry.unregister(id) else {
            return;
        };
        let joined = conn.rooms();
        let mut rooms = self.rooms.write();
        for room in &joined {
            if let Some(members) = rooms.get_mut(room) {
                let _ = members.remove(id);
                if members.is_empty() {
                    let _ = rooms.remove(room);
                }
            }
        }
        drop(rooms);
        counter!(relay_metrics::RELAY_EVICTIONS_TOTAL, "reason" => reason).increment(1);
        debug!(conn_id = %id, reason, rooms = joined.len(), "connection evicted");
    }

    /// Current members of a room.
    #[must_use]
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .read()
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live (non-empty) rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
