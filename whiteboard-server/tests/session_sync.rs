//! Multi-client session integration tests.
//!
//! Drives a real server over WebSocket: join handshake, drawing fan-out,
//! undo/redo relay, late joiners and session isolation.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use common::TestServer;

type WsError = tokio_tungstenite::tungstenite::Error;

/// Helper to receive the next text frame with timeout, skipping control frames.
async fn recv_text(
    stream: &mut (impl StreamExt<Item = Result<Message, WsError>> + Unpin),
    wait: Duration,
) -> Option<String> {
    loop {
        let msg = timeout(wait, stream.next()).await.ok()??.ok()?;
        match msg {
            Message::Text(text) => return Some(text),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return None,
        }
    }
}

/// Helper to receive and parse a JSON message with timeout.
async fn recv_json(
    stream: &mut (impl StreamExt<Item = Result<Message, WsError>> + Unpin),
) -> Option<Value> {
    let text = recv_text(stream, Duration::from_secs(5)).await?;
    serde_json::from_str(&text).ok()
}

/// Assert nothing arrives within a short window.
async fn expect_silence(stream: &mut (impl StreamExt<Item = Result<Message, WsError>> + Unpin)) {
    let got = recv_text(stream, Duration::from_millis(200)).await;
    assert!(got.is_none(), "unexpected message: {got:?}");
}

/// Helper to send a JSON message.
async fn send_json<S>(sink: &mut S, value: &Value) -> Result<(), String>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    send_text(sink, &text).await
}

/// Helper to send raw text.
async fn send_text<S>(sink: &mut S, text: &str) -> Result<(), String>
where
    S: SinkExt<Message> + Unpin,
{
    sink.send(Message::Text(text.to_string()))
        .await
        .map_err(|_| "send failed".to_string())
}

fn line_payload() -> Value {
    json!({
        "kind": "line",
        "start": {"x": 0, "y": 0},
        "end": {"x": 10, "y": 10},
        "lineWidth": 2,
        "color": {"r": 0, "g": 0, "b": 0, "a": 255}
    })
}

fn drawing(content: Value) -> Value {
    json!({"MsgType": "drawing", "Content": content})
}

fn control(msg_type: &str) -> Value {
    json!({"MsgType": msg_type, "Content": null})
}

/// Connect and join `directive`; returns the split stream and the session id.
async fn join(
    server: &TestServer,
    directive: &str,
) -> (
    impl SinkExt<Message> + Unpin,
    impl StreamExt<Item = Result<Message, WsError>> + Unpin,
    String,
    Value,
) {
    let (ws, _) = connect_async(&server.ws_url())
        .await
        .expect("failed to connect");
    let (mut write, mut read) = ws.split();
    send_text(&mut write, directive).await.expect("send join");

    let id = recv_text(&mut read, Duration::from_secs(5))
        .await
        .expect("session id");
    let history = recv_json(&mut read).await.expect("history");
    (write, read, id, history)
}

#[tokio::test]
async fn init_creates_session_and_returns_id_then_history() {
    let server = TestServer::start().await;

    let (_write, _read, id, history) = join(&server, "init").await;

    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(history["MsgType"], "history");
    assert_eq!(history["Content"]["Actions"], json!([]));
    assert_eq!(history["Content"]["RedoArr"], json!([]));
    assert!(server.state().registry.get(&id).is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn drawing_reaches_others_but_not_sender() {
    let server = TestServer::start().await;

    let (mut write1, mut read1, id, _) = join(&server, "init").await;
    let (_write2, mut read2, id2, _) = join(&server, &id).await;
    assert_eq!(id, id2);

    send_json(&mut write1, &drawing(line_payload()))
        .await
        .expect("send drawing");

    let relayed = recv_json(&mut read2).await.expect("relayed drawing");
    assert_eq!(relayed["MsgType"], "drawing");
    assert_eq!(relayed["Content"]["kind"], "line");
    assert_eq!(relayed["Content"]["end"], json!({"x": 10.0, "y": 10.0}));

    expect_silence(&mut read1).await;

    server.shutdown().await;
}

#[tokio::test]
async fn undo_and_redo_reach_every_member() {
    let server = TestServer::start().await;

    let (mut write1, mut read1, id, _) = join(&server, "room-undo").await;
    let (_write2, mut read2, _, _) = join(&server, &id).await;

    send_json(&mut write1, &drawing(line_payload()))
        .await
        .expect("send drawing");
    recv_json(&mut read2).await.expect("drawing");

    send_json(&mut write1, &control("history_undo"))
        .await
        .expect("send undo");
    for read in [&mut read1, &mut read2] {
        let msg = recv_json(read).await.expect("undo relayed");
        assert_eq!(msg["MsgType"], "history_undo");
        assert_eq!(msg["Content"], Value::Null);
    }

    send_json(&mut write1, &control("history_redo"))
        .await
        .expect("send redo");
    for read in [&mut read1, &mut read2] {
        let msg = recv_json(read).await.expect("redo relayed");
        assert_eq!(msg["MsgType"], "history_redo");
    }

    let session = server.state().registry.get(&id).expect("session");
    assert_eq!(session.snapshot().log.len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn late_joiner_receives_redo_stack_and_follows_redo() {
    let server = TestServer::start().await;

    let (mut write1, mut read1, id, _) = join(&server, "init").await;
    send_json(&mut write1, &drawing(line_payload()))
        .await
        .expect("send drawing");
    send_json(&mut write1, &control("history_undo"))
        .await
        .expect("send undo");
    let undo = recv_json(&mut read1).await.expect("undo echo");
    assert_eq!(undo["MsgType"], "history_undo");

    let (_write2, mut read2, _, history) = join(&server, &id).await;
    assert_eq!(history["Content"]["Actions"], json!([]));
    let redo_stack = history["Content"]["RedoArr"]
        .as_array()
        .expect("redo array");
    assert_eq!(redo_stack.len(), 1);
    assert_eq!(redo_stack[0]["kind"], "line");

    send_json(&mut write1, &control("history_redo"))
        .await
        .expect("send redo");
    let redo = recv_json(&mut read2).await.expect("redo relayed");
    assert_eq!(redo["MsgType"], "history_redo");

    let session = server.state().registry.get(&id).expect("session");
    let snapshot = session.snapshot();
    assert_eq!(snapshot.log.len(), 1);
    assert!(snapshot.redo.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn sessions_are_isolated() {
    let server = TestServer::start().await;

    let (mut write1, _read1, _, _) = join(&server, "alpha").await;
    let (_write2, mut read2, _, _) = join(&server, "beta").await;

    send_json(&mut write1, &drawing(line_payload()))
        .await
        .expect("send drawing");
    send_json(&mut write1, &control("history_undo"))
        .await
        .expect("send undo");

    expect_silence(&mut read2).await;
    let beta = server.state().registry.get("beta").expect("beta");
    assert!(beta.snapshot().log.is_empty());
    assert!(beta.snapshot().redo.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn bad_frames_are_dropped_without_closing() {
    let server = TestServer::start().await;

    let (ws, _) = connect_async(&server.ws_url())
        .await
        .expect("failed to connect");
    let (mut write, mut read) = ws.split();

    // Before joining: envelopes and invalid ids are ignored.
    send_json(&mut write, &drawing(line_payload()))
        .await
        .expect("send drawing");
    send_text(&mut write, "not a valid id!")
        .await
        .expect("send bad join");
    expect_silence(&mut read).await;

    send_text(&mut write, "room-bad").await.expect("send join");
    assert_eq!(
        recv_text(&mut read, Duration::from_secs(5)).await.as_deref(),
        Some("room-bad")
    );
    recv_json(&mut read).await.expect("history");

    // After joining: garbage, unknown types, invalid commands, second join.
    send_text(&mut write, "{garbage").await.expect("send");
    send_json(&mut write, &control("scribble")).await.expect("send");
    send_json(&mut write, &drawing(json!({"kind": "circle"})))
        .await
        .expect("send");
    send_text(&mut write, "other-room").await.expect("send");

    // The connection is still usable.
    send_json(&mut write, &control("getHistory"))
        .await
        .expect("send getHistory");
    let history = recv_json(&mut read).await.expect("history");
    assert_eq!(history["MsgType"], "history");
    assert_eq!(history["Content"]["Actions"], json!([]));
    assert!(server.state().registry.get("other-room").is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn oversized_messages_are_dropped() {
    let mut config = whiteboard_server::ServerConfig::default();
    config.connection.heartbeat = None;
    config.connection.max_message_bytes = 256;
    let server = TestServer::start_with(config).await;

    let (mut write, mut read, id, _) = join(&server, "init").await;

    let segments: Vec<Value> = (0..50)
        .map(|i| json!({"start": {"x": i, "y": 0}, "end": {"x": i + 1, "y": 0}}))
        .collect();
    send_json(
        &mut write,
        &drawing(json!({"kind": "pencilStroke", "actions": segments})),
    )
    .await
    .expect("send oversized");

    send_json(&mut write, &control("getHistory"))
        .await
        .expect("send getHistory");
    let history = recv_json(&mut read).await.expect("history");
    assert_eq!(history["Content"]["Actions"], json!([]));
    let session = server.state().registry.get(&id).expect("session");
    assert!(session.snapshot().log.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn session_disposed_after_last_member_leaves() {
    let server = TestServer::start().await;

    let (mut write, _read, id, _) = join(&server, "init").await;
    assert!(server.state().registry.get(&id).is_some());

    write.close().await.ok();

    let mut disposed = false;
    for _ in 0..50 {
        if server.state().registry.get(&id).is_none() {
            disposed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(disposed, "session should be disposed after its last member left");

    server.shutdown().await;
}

#[tokio::test]
async fn silent_connection_times_out() {
    let mut config = whiteboard_server::ServerConfig::default();
    config.connection.heartbeat = Some(Duration::from_millis(100));
    let server = TestServer::start_with(config).await;

    // Join, then stop reading so pings are never answered.
    let (_write, _read, id, _) = join(&server, "init").await;

    let mut disposed = false;
    for _ in 0..50 {
        if server.state().registry.get(&id).is_none() {
            disposed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(disposed, "silent connection should be closed as lost");

    server.shutdown().await;
}

#[tokio::test]
async fn member_that_stops_reading_is_dropped_as_lost() {
    let mut config = whiteboard_server::ServerConfig::default();
    config.connection.heartbeat = Some(Duration::from_millis(500));
    config.connection.rate_limit_burst = 10_000;
    config.connection.rate_limit_sustained = 10_000;
    let server = TestServer::start_with(config).await;

    // The stalled member joins, then never polls its socket again.
    let (_stalled_write, _stalled_read, id, _) = join(&server, "stalled-room").await;
    let (mut write, mut read, _, _) = join(&server, &id).await;
    let session = server.state().registry.get(&id).expect("session");
    assert_eq!(session.member_count(), 2);

    // Roughly 90 KB per stroke; enough to fill every buffer between the
    // server and the stalled reader.
    let segments: Vec<Value> = (0..1500)
        .map(|i| json!({"start": {"x": i, "y": 0}, "end": {"x": i + 1, "y": 1}}))
        .collect();
    let stroke = drawing(json!({"kind": "pencilStroke", "actions": segments}));
    let text = serde_json::to_string(&stroke).expect("encode stroke");
    for _ in 0..400 {
        send_text(&mut write, &text).await.expect("send stroke");
    }

    let mut dropped = false;
    for _ in 0..100 {
        if session.member_count() == 1 {
            dropped = true;
            break;
        }
        // Keep the active member visibly alive; the frame itself is ignored.
        send_text(&mut write, "{}").await.expect("send keepalive");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(dropped, "stalled member should have been dropped as lost");

    // The active member is unaffected.
    send_json(&mut write, &control("history_undo"))
        .await
        .expect("send undo");
    let echo = recv_json(&mut read).await.expect("undo echo");
    assert_eq!(echo["MsgType"], "history_undo");
    assert_eq!(session.member_count(), 1);

    server.shutdown().await;
}
