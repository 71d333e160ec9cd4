//! Server-push event stream (SSE) transport adapter.
//!
//! One-directional: the relay cannot observe client liveness, so each
//! successfully emitted heartbeat counts as proof the stream is still
//! writable, and every stream is closed unconditionally at the lifetime cap
//! so clients re-handshake through fresh infrastructure. The client
//! reconnects on close.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use pulse_core::Envelope;

use crate::connection::{Connection, TransportKind};
use crate::errors::RelayError;
use crate::server::{AppState, AuthedUser};

/// GET /events — open a server-push event stream.
pub async fn stream_handler(
    State(state): State<AppState>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
) -> Response {
    let (tx, rx) = mpsc::channel(state.config.send_buffer);
    let conn = match state.registry.register(TransportKind::Stream, user, tx) {
        Ok(conn) => conn,
        Err(RelayError::ResourceExhausted { limit }) => {
            warn!(limit, "stream rejected, registry at capacity");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Err(err) => {
            warn!(error = %err, "stream registration failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = state
        .router
        .join(&conn.id, pulse_core::RoomId::User(conn.owner.clone()))
    {
        warn!(error = %err, "auto-join of user room failed");
        state.router.evict(&conn.id);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    // The feeder owns the envelope channel and pushes serialized SSE events;
    // when the client goes away the events channel closes and the feeder
    // evicts the connection.
    let (events_tx, events_rx) = mpsc::channel::<Result<Event, Infallible>>(state.config.send_buffer);
    let _ = tokio::spawn(feed_stream(state, conn, rx, events_tx));

    // Heartbeats are emitted by the feeder on the relay's cadence, so no
    // additional axum keep-alive layer.
    Sse::new(ReceiverStream::new(events_rx)).into_response()
}

/// Pump envelopes and heartbeats into the SSE channel until the client
/// disconnects, the lifetime cap is reached, or the connection is evicted,
/// then clean up the connection.
#[instrument(skip_all, fields(conn_id = %conn.id, owner = %conn.owner))]
async fn feed_stream(
    state: AppState,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Envelope>,
    events: mpsc::Sender<Result<Event, Infallible>>,
) {
    info!("event stream started");
    pump(&state, &conn, rx, &events).await;
    state.router.evict(&conn.id);
    info!("event stream ended");
}

async fn pump(
    state: &AppState,
    conn: &Arc<Connection>,
    mut rx: mpsc::Receiver<Envelope>,
    events: &mpsc::Sender<Result<Event, Infallible>>,
) {
    let cancel = conn.cancel_token();
    let deadline = Instant::now() + state.config.stream_lifetime();
    let mut heartbeat = tokio::time::interval(state.config.heartbeat_interval());
    let _ = heartbeat.tick().await; // immediate first tick

    // The handshake event goes out before anything else.
    match emit(events, &Envelope::connected_now(), &cancel, deadline).await {
        EmitOutcome::Sent => {
            let _ = state.registry.touch_heartbeat(&conn.id, Instant::now());
        }
        EmitOutcome::ClientGone | EmitOutcome::Interrupted => return,
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("stream cancelled");
                return;
            }
            () = tokio::time::sleep_until(deadline) => {
                info!("stream lifetime cap reached, closing");
                return;
            }
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { return };
                match emit(events, &envelope, &cancel, deadline).await {
                    EmitOutcome::Sent => {}
                    EmitOutcome::ClientGone => {
                        debug!("stream client gone");
                        return;
                    }
                    EmitOutcome::Interrupted => return,
                }
            }
            _ = heartbeat.tick() => {
                match emit(events, &Envelope::heartbeat_now(), &cancel, deadline).await {
                    EmitOutcome::Sent => {
                        // A written heartbeat is the only liveness signal a
                        // one-directional stream can produce.
                        if state.registry.touch_heartbeat(&conn.id, Instant::now()).is_err() {
                            return;
                        }
                    }
                    EmitOutcome::ClientGone => {
                        debug!("stream client gone");
                        return;
                    }
                    EmitOutcome::Interrupted => return,
                }
            }
        }
    }
}

/// Outcome of handing one event to the SSE channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EmitOutcome {
    /// Queued for the client.
    Sent,
    /// The client side of the stream is gone.
    ClientGone,
    /// Cancelled or past the lifetime deadline while the channel was full;
    /// the stream must close now.
    Interrupted,
}

/// Serialize an envelope as an SSE data event and send it, racing the cancel
/// token and the lifetime deadline so a stalled client cannot pin the feeder
/// past either.
async fn emit(
    events: &mpsc::Sender<Result<Event, Infallible>>,
    envelope: &Envelope,
    cancel: &CancellationToken,
    deadline: Instant,
) -> EmitOutcome {
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize stream event");
            return EmitOutcome::Sent;
        }
    };
    tokio::select! {
        () = cancel.cancelled() => EmitOutcome::Interrupted,
        () = tokio::time::sleep_until(deadline) => EmitOutcome::Interrupted,
        sent = events.send(Ok(Event::default().data(json))) => {
            if sent.is_ok() {
                EmitOutcome::Sent
            } else {
                EmitOutcome::ClientGone
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
