//! End-to-end tests over real WebSocket connections.
//!
//! Each test starts a listening server with a temp-directory store and
//! drives it with raw tokio-tungstenite clients.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use atelier_collab::protocol::ServerEvent;
use atelier_collab::server::{CollabServer, ServerConfig};
use atelier_collab::storage::StoreConfig;
use atelier_core::{CanvasState, ChatMessage, Resource, ResourceKind};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server on a free port; keep the temp dir alive for the test.
async fn start_server() -> (u16, Arc<CollabServer>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        store: StoreConfig::for_testing(dir.path().join("db")),
        send_buffer: 2048,
    };
    let server = Arc::new(CollabServer::open(config).unwrap());
    let runner = server.clone();
    tokio::spawn(async move {
        let _ = runner.run().await;
    });
    // Give the listener time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, server, dir)
}

async fn connect(port: u16, session: &str) -> WsClient {
    let url = format!("ws://127.0.0.1:{port}/ws/{session}");
    let (ws, _) = connect_async(&url).await.expect("connect should succeed");
    ws
}

/// Receive the next decoded event, skipping non-text frames.
async fn recv_event(ws: &mut WsClient) -> ServerEvent {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return ServerEvent::decode(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsClient, json: String) {
    ws.send(Message::text(json)).await.unwrap();
}

fn canvas_with_resource(id: &str, prompt: &str) -> CanvasState {
    CanvasState {
        resources: vec![Resource {
            id: id.to_string(),
            kind: ResourceKind::NetworkBoundary,
            name: id.to_string(),
            x: 50.0,
            y: 60.0,
            properties: serde_json::Map::new(),
            notes: String::new(),
        }],
        connections: Vec::new(),
        user_prompt: prompt.to_string(),
        last_updated: 0,
    }
}

fn canvas_update_frame(canvas: &CanvasState) -> String {
    format!(
        r#"{{"type":"canvas_update","data":{}}}"#,
        serde_json::to_string(canvas).unwrap()
    )
}

fn chat_frame(message: &ChatMessage) -> String {
    format!(
        r#"{{"type":"chat_message","data":{}}}"#,
        serde_json::to_string(message).unwrap()
    )
}

#[tokio::test]
async fn test_connect_acknowledged_with_live_count() {
    let (port, _server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    match recv_event(&mut alice).await {
        ServerEvent::Connected {
            session_id,
            active_users,
        } => {
            assert_eq!(session_id, "s1");
            assert_eq!(active_users, 1);
        }
        other => panic!("expected connected ack, got {other:?}"),
    }

    let mut bob = connect(port, "s1").await;
    match recv_event(&mut bob).await {
        ServerEvent::Connected { active_users, .. } => assert_eq!(active_users, 2),
        other => panic!("expected connected ack, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_path_refused() {
    let (port, _server, _dir) = start_server().await;

    let result = connect_async(&format!("ws://127.0.0.1:{port}/elsewhere")).await;
    assert!(result.is_err(), "non /ws/{{session}} path must be refused");
    let result = connect_async(&format!("ws://127.0.0.1:{port}/ws/")).await;
    assert!(result.is_err(), "empty session must be refused");
}

#[tokio::test]
async fn test_empty_session_sends_no_snapshot() {
    let (port, _server, _dir) = start_server().await;

    let mut alice = connect(port, "fresh").await;
    let _connected = recv_event(&mut alice).await;

    // Nothing else should arrive: no snapshot exists yet
    let silence = timeout(Duration::from_millis(200), alice.next()).await;
    assert!(silence.is_err(), "expected no snapshot for an empty session");
}

#[tokio::test]
async fn test_late_joiner_receives_snapshot() {
    let (port, _server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _connected = recv_event(&mut alice).await;

    let canvas = canvas_with_resource("vpc_1", "one boundary");
    send_json(&mut alice, canvas_update_frame(&canvas)).await;
    // Alice gets her own accepted update back
    match recv_event(&mut alice).await {
        ServerEvent::CanvasUpdate { data } => assert_eq!(data.resources[0].id, "vpc_1"),
        other => panic!("expected canvas_update echo, got {other:?}"),
    }

    let mut bob = connect(port, "s1").await;
    let _connected = recv_event(&mut bob).await;
    match recv_event(&mut bob).await {
        ServerEvent::CanvasState { data } => {
            assert_eq!(data.resources.len(), 1);
            assert_eq!(data.resources[0].id, "vpc_1");
            assert_eq!(data.user_prompt, "one boundary");
        }
        other => panic!("expected canvas_state snapshot, got {other:?}"),
    }
}

// Scenario: two participants in one session; an update from one reaches both.
#[tokio::test]
async fn test_canvas_update_fans_out_to_session() {
    let (port, server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _ = recv_event(&mut alice).await;
    let mut bob = connect(port, "s1").await;
    let _ = recv_event(&mut bob).await;
    assert_eq!(server.service().active_users("s1").await, 2);

    let canvas = canvas_with_resource("vpc_1", "");
    send_json(&mut alice, canvas_update_frame(&canvas)).await;

    for client in [&mut alice, &mut bob] {
        match recv_event(client).await {
            ServerEvent::CanvasUpdate { data } => {
                assert!(data.resources.iter().any(|r| r.id == "vpc_1"));
            }
            other => panic!("expected canvas_update, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_updates_stay_in_their_session() {
    let (port, _server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _ = recv_event(&mut alice).await;
    let mut carol = connect(port, "s2").await;
    let _ = recv_event(&mut carol).await;

    send_json(&mut alice, canvas_update_frame(&canvas_with_resource("vpc_1", ""))).await;
    let _ = recv_event(&mut alice).await; // own echo

    let silence = timeout(Duration::from_millis(200), carol.next()).await;
    assert!(silence.is_err(), "s2 must not observe s1 traffic");
}

// Scenario: a disconnect is announced to the remnant with the new count.
#[tokio::test]
async fn test_disconnect_announced_to_remaining() {
    let (port, server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _ = recv_event(&mut alice).await;
    let mut bob = connect(port, "s1").await;
    let _ = recv_event(&mut bob).await;
    assert_eq!(server.service().active_users("s1").await, 2);

    alice.close(None).await.unwrap();

    match recv_event(&mut bob).await {
        ServerEvent::UserDisconnected { active_users } => assert_eq!(active_users, 1),
        other => panic!("expected user_disconnected, got {other:?}"),
    }
    // The slot was released before the announcement went out
    assert_eq!(server.service().active_users("s1").await, 1);
}

#[tokio::test]
async fn test_chat_message_fans_out_and_persists() {
    let (port, server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _ = recv_event(&mut alice).await;
    let mut bob = connect(port, "s1").await;
    let _ = recv_event(&mut bob).await;

    let message = ChatMessage::new("s1", "u1", "Alice", "shall we add a cache?");
    send_json(&mut alice, chat_frame(&message)).await;

    for client in [&mut alice, &mut bob] {
        match recv_event(client).await {
            ServerEvent::ChatMessage { data } => assert_eq!(data.text, "shall we add a cache?"),
            other => panic!("expected chat_message, got {other:?}"),
        }
    }

    let history = server.service().chat_history("s1", 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].username, "Alice");
}

// Scenario: 1001 messages; the log retains exactly the 1000 most recent.
#[tokio::test]
async fn test_chat_log_cap_over_websocket() {
    let (port, server, _dir) = start_server().await;

    let mut alice = connect(port, "s2").await;
    let _ = recv_event(&mut alice).await;

    for i in 0..1001 {
        let message = ChatMessage::new("s2", "u1", "Alice", format!("m{i}"));
        send_json(&mut alice, chat_frame(&message)).await;
        // Await the echo so every append completed before the next send
        match recv_event(&mut alice).await {
            ServerEvent::ChatMessage { data } => assert_eq!(data.text, format!("m{i}")),
            other => panic!("expected chat_message echo, got {other:?}"),
        }
    }

    let history = server.service().chat_history("s2", 1000).unwrap();
    assert_eq!(history.len(), 1000);
    // Only the very first message was evicted
    assert_eq!(history[0].text, "m1");
    assert_eq!(history[999].text, "m1000");
}

// Scenario: concurrent writers; the stored canvas is one write or the
// other, never a union.
#[tokio::test]
async fn test_concurrent_updates_last_write_wins() {
    let (port, server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _ = recv_event(&mut alice).await;
    let mut bob = connect(port, "s1").await;
    let _ = recv_event(&mut bob).await;

    let from_alice = canvas_with_resource("vpc_a", "alice wrote this");
    let from_bob = canvas_with_resource("vpc_b", "bob wrote this");
    send_json(&mut alice, canvas_update_frame(&from_alice)).await;
    send_json(&mut bob, canvas_update_frame(&from_bob)).await;

    // Both writes are done once each client saw both fan-outs
    for client in [&mut alice, &mut bob] {
        for _ in 0..2 {
            match recv_event(client).await {
                ServerEvent::CanvasUpdate { .. } => {}
                other => panic!("expected canvas_update, got {other:?}"),
            }
        }
    }

    let stored = server.service().canvas("s1").unwrap();
    assert_eq!(stored.resources.len(), 1, "no union of concurrent writes");
    let id = stored.resources[0].id.as_str();
    assert!(id == "vpc_a" || id == "vpc_b");
    if id == "vpc_a" {
        assert_eq!(stored.user_prompt, "alice wrote this");
    } else {
        assert_eq!(stored.user_prompt, "bob wrote this");
    }
}

#[tokio::test]
async fn test_malformed_frames_rejected_connection_survives() {
    let (port, server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _ = recv_event(&mut alice).await;

    // Garbage, an unknown type, and bad data: each rejected on its own
    send_json(&mut alice, "this is not json".to_string()).await;
    send_json(&mut alice, r#"{"type":"cursor_moved","data":{}}"#.to_string()).await;
    send_json(
        &mut alice,
        r#"{"type":"canvas_update","data":{"resources":42}}"#.to_string(),
    )
    .await;
    alice
        .send(Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();

    // No state was mutated and nothing was broadcast
    assert!(server.service().canvas("s1").unwrap().is_empty());

    // The connection still works
    let message = ChatMessage::new("s1", "u1", "Alice", "still here");
    send_json(&mut alice, chat_frame(&message)).await;
    match recv_event(&mut alice).await {
        ServerEvent::ChatMessage { data } => assert_eq!(data.text, "still here"),
        other => panic!("expected chat_message, got {other:?}"),
    }
    assert_eq!(server.service().active_users("s1").await, 1);
}

#[tokio::test]
async fn test_accessor_replace_canvas_reaches_socket_clients() {
    let (port, server, _dir) = start_server().await;

    let mut alice = connect(port, "s1").await;
    let _ = recv_event(&mut alice).await;

    // A request/response front replaces the canvas; socket clients see it
    let canvas = canvas_with_resource("db_1", "via accessor");
    server.service().replace_canvas("s1", canvas).await.unwrap();

    match recv_event(&mut alice).await {
        ServerEvent::CanvasUpdate { data } => assert_eq!(data.resources[0].id, "db_1"),
        other => panic!("expected canvas_update, got {other:?}"),
    }
}
