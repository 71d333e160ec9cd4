//! WebSocket transport adapter.
//!
//! Each accepted socket becomes one registered connection: a writer task
//! drains the connection's envelope channel into outbound frames and pings
//! on the heartbeat cadence, while the reader loop parses client events and
//! records liveness. Any inbound frame counts as a heartbeat — a client that
//! only answers pings stays alive.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use pulse_core::{ChatMessage, Envelope, RoomId, now_millis};

use crate::connection::{Connection, TransportKind};
use crate::errors::RelayError;
use crate::server::{AppState, AuthedUser};
use crate::transport::protocol::{ClientEvent, socket_frame};

/// GET /ws — upgrade to a WebSocket session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
) -> Response {
    let (tx, rx) = mpsc::channel(state.config.send_buffer);
    let conn = match state.registry.register(TransportKind::Socket, user, tx) {
        Ok(conn) => conn,
        Err(RelayError::ResourceExhausted { limit }) => {
            warn!(limit, "socket rejected, registry at capacity");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Err(err) => {
            warn!(error = %err, "socket registration failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    ws.on_upgrade(move |socket| run_session(socket, state, conn, rx))
}

/// Drive one socket session until the client leaves or the relay evicts it.
#[instrument(skip_all, fields(conn_id = %conn.id, owner = %conn.owner))]
async fn run_session(
    socket: WebSocket,
    state: AppState,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Envelope>,
) {
    info!("socket session started");
    let (sink, stream) = socket.split();

    // Every connection lives in its own user room from the start.
    if let Err(err) = state.router.join(&conn.id, RoomId::User(conn.owner.clone())) {
        warn!(error = %err, "auto-join of user room failed");
        state.router.evict(&conn.id);
        return;
    }
    let _ = conn.push(Envelope::connected_now());

    let writer = tokio::spawn(write_loop(
        sink,
        rx,
        conn.clone(),
        state.config.heartbeat_interval(),
    ));

    read_loop(stream, &state, &conn).await;

    state.router.evict(&conn.id);
    let _ = writer.await;
    info!(dropped_heartbeats = conn.dropped_heartbeats(), "socket session ended");
}

/// How long the writer waits for the close frame to flush on cancellation.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Drain the envelope channel into socket frames, pinging on the heartbeat
/// cadence. Exits when the channel closes, the socket errors, or the
/// connection is cancelled — including mid-send, so a client that stops
/// draining its socket cannot block eviction or shutdown.
async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Envelope>,
    conn: Arc<Connection>,
    ping_interval: Duration,
) where
    S: Sink<Message> + Unpin,
{
    let cancel = conn.cancel_token();
    let mut ping = tokio::time::interval(ping_interval);
    let _ = ping.tick().await; // immediate first tick

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.send(Message::Close(None))).await;
                break;
            }
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let frame = match socket_frame(&envelope) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize outbound frame");
                        continue;
                    }
                };
                if !send_frame(&mut sink, &cancel, Message::Text(frame.into())).await {
                    break;
                }
            }
            _ = ping.tick() => {
                if !send_frame(&mut sink, &cancel, Message::Ping(Vec::new().into())).await {
                    break;
                }
            }
        }
    }
}

/// Send one frame, racing the connection's cancel token. Returns false when
/// the write loop should exit.
async fn send_frame<S>(sink: &mut S, cancel: &CancellationToken, message: Message) -> bool
where
    S: Sink<Message> + Unpin,
{
    tokio::select! {
        () = cancel.cancelled() => false,
        sent = sink.send(message) => sent.is_ok(),
    }
}

/// Parse inbound frames until close, error, or cancellation.
async fn read_loop(
    mut stream: futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    conn: &Arc<Connection>,
) {
    let cancel = conn.cancel_token();
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(message)) => {
                // Every inbound frame is a sign of life; an UnknownConnection
                // here means we were evicted mid-flight.
                if state.registry.touch_heartbeat(&conn.id, Instant::now()).is_err() {
                    break;
                }
                match message {
                    Message::Text(text) => handle_client_event(state, conn, text.as_str()),
                    Message::Close(_) => {
                        debug!("client closed");
                        break;
                    }
                    // axum answers pings itself.
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
                }
            }
            Some(Err(err)) => {
                debug!(error = %err, "socket read error");
                break;
            }
            None => break,
        }
    }
}

/// Dispatch one parsed client event. Malformed frames are logged and skipped.
fn handle_client_event(state: &AppState, conn: &Arc<Connection>, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "malformed client event, skipping");
            return;
        }
    };

    let outcome = match event {
        ClientEvent::JoinRoom { room } => state.router.join(&conn.id, room),
        ClientEvent::JoinUserRoom => state
            .router
            .join(&conn.id, RoomId::User(conn.owner.clone())),
        ClientEvent::JoinProject { project_id } => {
            state.router.join(&conn.id, RoomId::Project(project_id))
        }
        ClientEvent::LeaveProject { project_id } => {
            state.router.leave(&conn.id, &RoomId::Project(project_id));
            Ok(())
        }
        ClientEvent::SendMessage { project_id, body } => {
            let handed = state.dispatcher.broadcast_chat(ChatMessage {
                project_id,
                sender: conn.owner.clone(),
                body,
                timestamp: now_millis(),
            });
            debug!(handed, "chat broadcast");
            Ok(())
        }
        // touch already happened above.
        ClientEvent::Heartbeat => Ok(()),
    };

    if let Err(err) = outcome {
        // A rejected join leaves the connection alive; the client sees
        // silence in that room, not a disconnect.
        warn!(error = %err, "client event rejected");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
