//! Presence monitor — periodic sweep evicting silent connections.
//!
//! Heartbeat observations are recorded by the transports; this task only
//! reads them. A connection that has produced no sign of life for the
//! configured timeout is presumed dead and evicted, which frees its registry
//! slot and room memberships even when the peer vanished without a close
//! frame.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::router::RoomRouter;

/// Periodically evicts connections whose heartbeat has gone stale.
pub struct PresenceMonitor {
    router: Arc<RoomRouter>,
    config: RelayConfig,
}

impl PresenceMonitor {
    /// Create a monitor over the given router.
    #[must_use]
    pub fn new(router: Arc<RoomRouter>, config: RelayConfig) -> Self {
        Self { router, config }
    }

    /// Run one sweep now. Returns the number of connections evicted.
    pub fn sweep(&self, now: Instant) -> usize {
        let timeout = self.config.heartbeat_timeout();
        let mut evicted = 0;
        for conn in self.router.registry().snapshot() {
            if conn.stale(now, timeout) {
                debug!(
                    conn_id = %conn.id,
                    owner = %conn.owner,
                    transport = conn.transport.as_str(),
                    age_secs = conn.age().as_secs(),
                    "heartbeat timeout, evicting"
                );
                self.router.evict_with_reason(&conn.id, "stale");
                evicted += 1;
            }
        }
        evicted
    }

    /// Spawn the sweep loop. Stops when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("presence monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.sweep(Instant::now());
                        if evicted > 0 {
                            info!(evicted, "presence sweep evicted stale connections");
                        }
                    }
                }
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
