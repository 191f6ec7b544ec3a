//! Integration tests for the camstream WebSocket server.
//!
//! Each test binds a real listener on `127.0.0.1:0`, serves it with
//! [`serve`], and talks to it with a `tokio-tungstenite` client, exactly as a
//! browser consumer would.
//!
//! Run with: `cargo test --test streaming_integration`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camstream_core::ConnectionState;
use camstream_server::application::{OutboundMessage, RequestController, StreamServer, WriteError};
use camstream_server::domain::ServerConfig;
use camstream_server::infrastructure::{serve, REJECT_REASON};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    addr: SocketAddr,
    server: Arc<StreamServer>,
    running: Arc<AtomicBool>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn spawn_server(config: ServerConfig) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(StreamServer::new(&config));
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(serve(
        listener,
        config,
        Arc::clone(&server),
        Arc::clone(&running),
    ));
    Harness {
        addr,
        server,
        running,
    }
}

async fn started_server() -> Harness {
    let h = spawn_server(ServerConfig::default()).await;
    h.server.start();
    h
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = timeout(WAIT, connect_async(format!("ws://{addr}/")))
        .await
        .expect("connect timed out")
        .expect("handshake failed");
    ws
}

/// Connects and waits until the server has bound the session.
async fn connect_attached(h: &Harness) -> Client {
    let ws = connect(h.addr).await;
    wait_until(|| h.server.lifecycle().snapshot().consumer.is_some()).await;
    ws
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Next data or close message, skipping pings and pongs.
async fn next_message(ws: &mut Client) -> Message {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("receive error");
        match msg {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

/// Asserts that nothing arrives within `window`.
async fn assert_silent(ws: &mut Client, window: Duration) {
    if let Ok(Some(Ok(msg))) = timeout(window, ws.next()).await {
        panic!("expected no message, got {msg:?}");
    }
}

fn text(s: &str) -> Message {
    Message::Text(s.to_string())
}

// ── Ordering ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_messages_arrive_in_submission_order() {
    // Arrange
    let h = started_server().await;
    let mut ws = connect_attached(&h).await;

    // Act
    for i in 0..20 {
        h.server.submit_text(format!("m{i}")).unwrap();
    }

    // Assert
    for i in 0..20 {
        assert_eq!(next_message(&mut ws).await, text(&format!("m{i}")));
    }
}

#[tokio::test]
async fn test_batch_then_single_arrive_as_a_b_01_c() {
    // Arrange
    let h = started_server().await;
    let mut ws = connect_attached(&h).await;

    // Act
    h.server
        .submit_batch(vec![
            OutboundMessage::text("A"),
            OutboundMessage::text("B"),
            OutboundMessage::binary(vec![0x01]),
        ])
        .unwrap();
    h.server.submit_text("C").unwrap();

    // Assert
    assert_eq!(next_message(&mut ws).await, text("A"));
    assert_eq!(next_message(&mut ws).await, text("B"));
    assert_eq!(next_message(&mut ws).await, Message::Binary(vec![0x01]));
    assert_eq!(next_message(&mut ws).await, text("C"));
}

#[tokio::test]
async fn test_concurrent_batches_are_not_interleaved() {
    // Arrange
    let h = started_server().await;
    let mut ws = connect_attached(&h).await;
    const SUBMITTERS: usize = 4;
    const BATCHES: usize = 25;

    // Act: several tasks submit 3-part batches at the same time
    let mut tasks = Vec::new();
    for t in 0..SUBMITTERS {
        let server = Arc::clone(&h.server);
        tasks.push(tokio::spawn(async move {
            for b in 0..BATCHES {
                server
                    .submit_batch(
                        (0..3)
                            .map(|part| OutboundMessage::text(format!("{t}/{b}/{part}")))
                            .collect(),
                    )
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Assert
    let mut received = Vec::new();
    for _ in 0..SUBMITTERS * BATCHES * 3 {
        match next_message(&mut ws).await {
            Message::Text(t) => received.push(t),
            other => panic!("unexpected message {other:?}"),
        }
    }
    for chunk in received.chunks(3) {
        let prefix = chunk[0].strip_suffix("/0").expect("batch must start with part 0");
        assert_eq!(chunk[1], format!("{prefix}/1"));
        assert_eq!(chunk[2], format!("{prefix}/2"));
    }
}

#[tokio::test]
async fn test_json_control_message_is_a_text_frame() {
    let h = started_server().await;
    let mut ws = connect_attached(&h).await;

    h.server
        .submit_control(&json!({"event": "configured", "width": 1280}))
        .unwrap();

    let Message::Text(t) = next_message(&mut ws).await else {
        panic!("control message must be text");
    };
    let v: Value = serde_json::from_str(&t).unwrap();
    assert_eq!(v, json!({"event": "configured", "width": 1280}));
}

#[tokio::test]
async fn test_binary_batch_arrives_as_one_tagged_message() {
    let h = started_server().await;
    let mut ws = connect_attached(&h).await;

    h.server.submit_frames(vec![vec![0x00], vec![10, 20, 30]]).unwrap();

    assert_eq!(next_message(&mut ws).await, Message::Binary(vec![0x00, 10, 20, 30]));
}

// ── Completion protocol ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_completion_fires_once_after_delivery() {
    // Arrange
    let h = started_server().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&fired);
    let handle = h
        .server
        .submit_text_with("hello", move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0, "nothing sent before a consumer");

    // Act
    let mut ws = connect_attached(&h).await;
    let msg = next_message(&mut ws).await;
    timeout(WAIT, handle).await.unwrap().unwrap();

    // Assert
    assert_eq!(msg, text("hello"));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_all_discards_pending_and_suppresses_completions() {
    // Arrange: no consumer, so everything stays queued
    let h = started_server().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for i in 0..5 {
        let f = Arc::clone(&fired);
        handles.push(
            h.server
                .submit_text_with(format!("x{i}"), move || {
                    f.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap(),
        );
    }

    // Act
    let discarded = h.server.cancel_all_writes();
    let mut ws = connect_attached(&h).await;
    h.server.submit_text("after").unwrap();

    // Assert
    assert_eq!(discarded, 5);
    for handle in handles {
        assert_eq!(timeout(WAIT, handle).await.unwrap(), Err(WriteError::Cancelled));
    }
    assert_eq!(next_message(&mut ws).await, text("after"));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_paused_submissions_are_delivered_in_order_after_start() {
    // Arrange
    let h = started_server().await;
    let mut ws = connect_attached(&h).await;
    h.server.pause().unwrap();

    // Act
    h.server.submit_text("one").unwrap();
    h.server.submit_frame(vec![2]).unwrap();
    h.server.submit_text("three").unwrap();
    assert_silent(&mut ws, Duration::from_millis(150)).await;
    h.server.start();

    // Assert
    assert_eq!(next_message(&mut ws).await, text("one"));
    assert_eq!(next_message(&mut ws).await, Message::Binary(vec![2]));
    assert_eq!(next_message(&mut ws).await, text("three"));
}

#[tokio::test]
async fn test_pause_submit_cancel_start_delivers_nothing() {
    // Arrange
    let h = started_server().await;
    let mut ws = connect_attached(&h).await;
    let fired = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&fired);

    // Act
    h.server.pause().unwrap();
    h.server
        .submit_control_with(&json!({"stale": true}), move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    h.server.cancel_all_writes();
    h.server.start();

    // Assert
    assert_silent(&mut ws, Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(h.server.pending_writes(), 0);
}

#[tokio::test]
async fn test_writes_buffered_while_disconnected_arrive_on_reconnect() {
    // Arrange
    let h = started_server().await;
    let first = connect_attached(&h).await;
    drop(first);
    wait_until(|| h.server.lifecycle().snapshot().consumer.is_none()).await;

    // Act
    h.server.submit_text("queued while closed").unwrap();
    let mut second = connect_attached(&h).await;

    // Assert
    assert_eq!(next_message(&mut second).await, text("queued while closed"));
}

#[tokio::test]
async fn test_reconnect_does_not_resume_a_paused_server() {
    // Arrange
    let h = started_server().await;
    let first = connect_attached(&h).await;
    h.server.pause().unwrap();
    drop(first);
    wait_until(|| h.server.lifecycle().snapshot().consumer.is_none()).await;
    h.server.submit_text("held").unwrap();

    // Act
    let mut second = connect_attached(&h).await;

    // Assert
    assert_eq!(h.server.state(), ConnectionState::Paused);
    assert_silent(&mut second, Duration::from_millis(200)).await;
    assert_eq!(h.server.pending_writes(), 1);

    h.server.start();
    assert_eq!(next_message(&mut second).await, text("held"));
}

#[tokio::test]
async fn test_second_consumer_is_rejected_without_disturbing_first() {
    // Arrange: the first consumer has received one message and has three
    // more queued behind a pause.
    let h = started_server().await;
    let mut first = connect_attached(&h).await;
    let first_session = h.server.lifecycle().snapshot().consumer.unwrap().session;
    h.server.submit_text("a").unwrap();
    assert_eq!(next_message(&mut first).await, text("a"));
    h.server.pause().unwrap();
    h.server.submit_text("b").unwrap();
    h.server.submit_frame(vec![0x01, 0xCC]).unwrap();
    h.server.submit_text("c").unwrap();

    // Act
    let mut second = connect(h.addr).await;
    let closing = next_message(&mut second).await;

    // Assert
    let Message::Close(Some(frame)) = closing else {
        panic!("second consumer must receive a close frame, got {closing:?}");
    };
    assert_eq!(frame.code, CloseCode::Policy);
    assert_eq!(frame.reason, REJECT_REASON);
    let snapshot = h.server.lifecycle().snapshot();
    assert_eq!(snapshot.consumer.unwrap().session, first_session);
    assert_eq!(h.server.pending_writes(), 3, "rejection must not touch the queue");

    h.server.start();
    h.server.submit_text("still here").unwrap();
    assert_eq!(next_message(&mut first).await, text("b"));
    assert_eq!(next_message(&mut first).await, Message::Binary(vec![0x01, 0xCC]));
    assert_eq!(next_message(&mut first).await, text("c"));
    assert_eq!(next_message(&mut first).await, text("still here"));
}

#[tokio::test]
async fn test_consumer_is_refused_before_start() {
    let h = spawn_server(ServerConfig::default()).await;

    let mut ws = connect(h.addr).await;

    assert!(matches!(next_message(&mut ws).await, Message::Close(Some(f)) if f.code == CloseCode::Policy));
    assert!(h.server.lifecycle().snapshot().consumer.is_none());
}

// ── Handshake ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_offered_subprotocol_is_confirmed() {
    let h = started_server().await;
    let mut request = format!("ws://{}/", h.addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", "jsbridge-protocol".parse().unwrap());

    let (_ws, response) = timeout(WAIT, connect_async(request)).await.unwrap().unwrap();

    assert_eq!(
        response.headers().get("Sec-WebSocket-Protocol").unwrap(),
        "jsbridge-protocol"
    );
}

// ── Inbound ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inbound_messages_reach_their_handlers() {
    // Arrange
    let h = started_server().await;
    let binary = Arc::new(Mutex::new(Vec::new()));
    let texts = Arc::new(Mutex::new(Vec::new()));
    let b = Arc::clone(&binary);
    h.server.on_binary_message(move |bytes| b.lock().unwrap().push(bytes));
    let t = Arc::clone(&texts);
    h.server.on_text_message(move |s| t.lock().unwrap().push(s));
    let mut ws = connect_attached(&h).await;

    // Act
    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    ws.send(text("hi")).await.unwrap();

    // Assert
    wait_until(|| texts.lock().unwrap().len() == 1).await;
    assert_eq!(*binary.lock().unwrap(), vec![vec![1, 2, 3]]);
    assert_eq!(*texts.lock().unwrap(), vec!["hi".to_string()]);
}

#[tokio::test]
async fn test_request_round_trip_through_controller() {
    // Arrange
    let h = started_server().await;
    let controller = RequestController::new(&h.server);
    controller.register("ping", |_| Some(json!("pong"))).unwrap();
    controller
        .register_async("slow-echo", |data| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            data
        })
        .unwrap();
    controller.install();
    let mut ws = connect_attached(&h).await;

    // Act
    ws.send(text(r#"{"request":"slow-echo","id":1,"data":"x"}"#))
        .await
        .unwrap();
    ws.send(text(r#"{"request":"ping","id":2}"#)).await.unwrap();

    // Assert: the sync reply overtakes the slow async one
    let mut replies = Vec::new();
    for _ in 0..2 {
        let Message::Text(t) = next_message(&mut ws).await else {
            panic!("reply must be text");
        };
        replies.push(serde_json::from_str::<Value>(&t).unwrap());
    }
    assert_eq!(replies[0], json!({"id": 2, "data": "pong"}));
    assert_eq!(replies[1], json!({"id": 1, "data": "x"}));
}
