//! Relay configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Policy knobs for the fan-out subsystem.
///
/// The relay runs embedded in a hosting server process, so there is no bind
/// address here — the host mounts the relay's router wherever it listens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Maximum concurrent registered connections.
    pub max_connections: usize,
    /// Per-connection send buffer capacity (envelopes).
    pub send_buffer: usize,
    /// Heartbeat interval in seconds (socket pings, stream keepalives).
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds; stale connections are evicted after
    /// this long without a heartbeat (policy: 2× the interval).
    pub heartbeat_timeout_secs: u64,
    /// Maximum lifetime of a server-push stream in seconds, after which the
    /// stream is closed unconditionally and the client reconnects.
    pub stream_lifetime_secs: u64,
    /// Presence monitor sweep period in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            send_buffer: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            stream_lifetime_secs: 300,
            sweep_interval_secs: 10,
        }
    }
}

impl RelayConfig {
    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat timeout as a [`Duration`].
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Stream lifetime cap as a [`Duration`].
    #[must_use]
    pub fn stream_lifetime(&self) -> Duration {
        Duration::from_secs(self.stream_lifetime_secs)
    }

    /// Presence sweep period as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
