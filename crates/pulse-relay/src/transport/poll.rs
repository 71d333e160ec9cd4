//! Polling fallback transport.
//!
//! Degraded mode for clients that cannot hold a persistent connection: they
//! probe `/poll` and fetch state through the host's regular HTTP API. No
//! connection is registered and no rooms are joined, so there is nothing to
//! heartbeat and nothing to evict.

use axum::Json;
use serde_json::{Value, json};

use pulse_core::now_millis;

/// GET /poll — synchronous status probe.
pub async fn poll_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": now_millis(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_answers_ok_with_timestamp() {
        let Json(body) = poll_handler().await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_i64().unwrap() > 1_577_836_800_000);
    }
}
