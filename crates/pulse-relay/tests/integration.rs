//! End-to-end tests over a real listener: WebSocket sessions, server-push
//! streams, and the persistence-before-publish dispatch path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pulse_core::{NewNotification, UserId};
use pulse_relay::{AuthedUser, NotificationDispatcher, RelayConfig, RelayServer};
use pulse_store::{ListOptions, MemoryNotificationStore};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Test stand-in for the host's auth layer: trusts an `x-user` header.
async fn header_auth(mut req: Request, next: Next) -> Response {
    let user = req
        .headers()
        .get("x-user")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    let _ = req.extensions_mut().insert(AuthedUser(UserId::from(user)));
    next.run(req).await
}

struct Harness {
    addr: SocketAddr,
    dispatcher: Arc<NotificationDispatcher>,
    server: RelayServer,
}

async fn boot(config: RelayConfig) -> Harness {
    let store = Arc::new(MemoryNotificationStore::new());
    let server = RelayServer::new(config, store);
    let dispatcher = server.dispatcher().clone();
    let app = server.router().layer(middleware::from_fn(header_auth));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _ = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        addr,
        dispatcher,
        server,
    }
}

async fn ws_connect(addr: SocketAddr, user: &str) -> WsClient {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    let _ = request
        .headers_mut()
        .insert("x-user", user.parse().unwrap());
    let (socket, _resp) = tokio_tungstenite::connect_async(request).await.unwrap();
    socket
}

/// Read frames until a non-control JSON frame arrives, with a timeout.
async fn next_frame(socket: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn expect_silence(socket: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                other => break other,
            }
        }
    })
    .await;
    assert!(result.is_err(), "expected no frames, got {result:?}");
}

#[tokio::test]
async fn socket_handshake_emits_connected() {
    let harness = boot(RelayConfig::default()).await;
    let mut socket = ws_connect(harness.addr, "u1").await;

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["event"], "connected");
    assert!(frame["data"]["timestamp"].is_i64());
}

#[tokio::test]
async fn notify_reaches_socket_after_persisting() {
    let harness = boot(RelayConfig::default()).await;
    let mut socket = ws_connect(harness.addr, "u1").await;
    let _ = next_frame(&mut socket).await; // connected

    let record = harness
        .dispatcher
        .notify(NewNotification::new("u1", "task_assigned", "Review", "please"))
        .unwrap();

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["event"], "new-notification");
    assert_eq!(frame["data"]["id"], record.id.as_str());
    assert_eq!(frame["data"]["title"], "Review");
    assert_eq!(frame["data"]["seq"], 1);

    // The durable record exists independently of live delivery.
    let listed = harness
        .dispatcher
        .list(&UserId::from("u1"), ListOptions::default())
        .unwrap();
    assert_eq!(listed, vec![record]);
}

#[tokio::test]
async fn user_rooms_are_isolated() {
    let harness = boot(RelayConfig::default()).await;
    let mut alice = ws_connect(harness.addr, "u1").await;
    let mut bob = ws_connect(harness.addr, "u2").await;
    let _ = next_frame(&mut alice).await;
    let _ = next_frame(&mut bob).await;

    let _ = harness
        .dispatcher
        .notify(NewNotification::new("u1", "mention", "T", "M"))
        .unwrap();

    let frame = next_frame(&mut alice).await;
    assert_eq!(frame["event"], "new-notification");
    expect_silence(&mut bob).await;
}

#[tokio::test]
async fn chat_fans_out_to_project_room() {
    let harness = boot(RelayConfig::default()).await;
    let mut alice = ws_connect(harness.addr, "u1").await;
    let mut bob = ws_connect(harness.addr, "u2").await;
    let _ = next_frame(&mut alice).await;
    let _ = next_frame(&mut bob).await;

    alice
        .send(Message::Text(
            r#"{"event":"join-project","projectId":"p1"}"#.into(),
        ))
        .await
        .unwrap();
    bob.send(Message::Text(
        r#"{"event":"join-project","projectId":"p1"}"#.into(),
    ))
    .await
    .unwrap();

    // Joins are processed in-order on each session; a brief pause lets both
    // land before publishing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice
        .send(Message::Text(
            r#"{"event":"send-message","projectId":"p1","body":"ship it"}"#.into(),
        ))
        .await
        .unwrap();

    let frame = next_frame(&mut bob).await;
    assert_eq!(frame["event"], "receive-message");
    assert_eq!(frame["data"]["projectId"], "p1");
    assert_eq!(frame["data"]["sender"], "u1");
    assert_eq!(frame["data"]["body"], "ship it");
}

#[tokio::test]
async fn dead_member_does_not_block_fanout() {
    let harness = boot(RelayConfig::default()).await;
    let mut alive = ws_connect(harness.addr, "u1").await;
    let _ = next_frame(&mut alive).await;

    // Second connection for the same user vanishes without a close frame.
    let dead = ws_connect(harness.addr, "u1").await;
    drop(dead);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let _ = harness
        .dispatcher
        .notify(NewNotification::new("u1", "mention", "T", "M"))
        .unwrap();

    let frame = next_frame(&mut alive).await;
    assert_eq!(frame["event"], "new-notification");
}

#[tokio::test]
async fn socket_and_stream_both_receive_for_same_user() {
    let harness = boot(RelayConfig::default()).await;
    let mut socket = ws_connect(harness.addr, "u1").await;
    let _ = next_frame(&mut socket).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{}/events", harness.addr))
        .header("x-user", "u1")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let mut body = resp.bytes_stream();

    // First SSE event is the handshake.
    let first = read_sse_event(&mut body).await;
    assert_eq!(first["type"], "connected");

    let _ = harness
        .dispatcher
        .notify(NewNotification::new("u1", "mention", "T", "M"))
        .unwrap();

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["event"], "new-notification");

    let event = read_sse_event(&mut body).await;
    assert_eq!(event["type"], "notification");
    assert_eq!(event["data"]["title"], "T");
}

#[tokio::test]
async fn stream_closes_at_lifetime_cap() {
    let config = RelayConfig {
        stream_lifetime_secs: 1,
        ..RelayConfig::default()
    };
    let harness = boot(config).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{}/events", harness.addr))
        .header("x-user", "u1")
        .send()
        .await
        .unwrap();
    let mut body = resp.bytes_stream();
    let first = read_sse_event(&mut body).await;
    assert_eq!(first["type"], "connected");
    assert_eq!(harness.server.registry().len(), 1);

    // The stream ends on its own and the slot is reclaimed.
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            let _ = chunk.unwrap();
        }
    })
    .await;
    assert!(ended.is_ok(), "stream did not close at the lifetime cap");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.server.registry().len(), 0);
}

#[tokio::test]
async fn capacity_rejects_excess_sockets() {
    let config = RelayConfig {
        max_connections: 1,
        ..RelayConfig::default()
    };
    let harness = boot(config).await;

    let mut first = ws_connect(harness.addr, "u1").await;
    let _ = next_frame(&mut first).await;

    let mut request = format!("ws://{}/ws", harness.addr)
        .into_client_request()
        .unwrap();
    let _ = request
        .headers_mut()
        .insert("x-user", "u2".parse().unwrap());
    let err = tokio_tungstenite::connect_async(request).await;
    assert!(err.is_err(), "second socket must be refused at capacity");

    // The first connection is unaffected.
    let _ = harness
        .dispatcher
        .notify(NewNotification::new("u1", "mention", "T", "M"))
        .unwrap();
    let frame = next_frame(&mut first).await;
    assert_eq!(frame["event"], "new-notification");
}

#[tokio::test]
async fn disconnect_frees_registry_slot() {
    let harness = boot(RelayConfig::default()).await;
    let mut socket = ws_connect(harness.addr, "u1").await;
    let _ = next_frame(&mut socket).await;
    assert_eq!(harness.server.registry().len(), 1);

    socket.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.server.registry().len(), 0);
    assert_eq!(harness.server.room_router().room_count(), 0);
}

#[tokio::test]
async fn shutdown_closes_live_sessions() {
    let harness = boot(RelayConfig::default()).await;
    let mut socket = ws_connect(harness.addr, "u1").await;
    let _ = next_frame(&mut socket).await;
    assert_eq!(harness.server.registry().len(), 1);

    harness.server.shutdown().shutdown();

    // The relay closes the socket from its side and frees the slot.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "shutdown must close the live socket session");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.server.registry().len(), 0);
    assert_eq!(harness.server.room_router().room_count(), 0);
}

#[tokio::test]
async fn malformed_client_event_is_skipped() {
    let harness = boot(RelayConfig::default()).await;
    let mut socket = ws_connect(harness.addr, "u1").await;
    let _ = next_frame(&mut socket).await;

    socket
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();

    // The session survives and still delivers.
    let _ = harness
        .dispatcher
        .notify(NewNotification::new("u1", "mention", "T", "M"))
        .unwrap();
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["event"], "new-notification");
}

/// Pull the next `data:` event from an SSE byte stream.
async fn read_sse_event(
    body: &mut (impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin),
) -> Value {
    let mut buffer = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(idx) = buffer.find("\n\n") {
            let event: String = buffer[..idx]
                .lines()
                .filter_map(|line| line.strip_prefix("data: "))
                .collect();
            let _ = buffer.drain(..idx + 2);
            if !event.is_empty() {
                return serde_json::from_str(&event).unwrap();
            }
            continue;
        }
        let chunk = tokio::time::timeout_at(deadline, body.next())
            .await
            .expect("timed out waiting for SSE event")
            .expect("stream ended")
            .expect("stream error");
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}
