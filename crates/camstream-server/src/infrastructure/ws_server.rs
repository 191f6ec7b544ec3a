//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from consumers.
//! 3. Upgrading each connection to a WebSocket session, echoing the
//!    configured subprotocol when the consumer offers it.
//! 4. Binding the session to the server's single consumer slot, or closing
//!    it with a policy-violation close frame if the slot is taken.
//! 5. Running two concurrent halves per session:
//!    - **Queue → Consumer**: the drain loop sends queued frames through a
//!      [`WsFrameSink`].
//!    - **Consumer → Server**: received text/binary messages are handed to
//!      [`StreamServer::deliver`].
//! 6. Releasing the consumer slot when either half ends.
//!
//! Shutdown is triggered by a shared `AtomicBool` that is cleared by the
//! Ctrl+C handler in `main.rs`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use camstream_core::{InboundMessage, LifecycleError, WireFrame};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::application::drain::{drain_queue, DrainExit, FrameSink, TransportError};
use crate::application::server::StreamServer;
use crate::domain::config::ServerConfig;

/// Close reason sent to a consumer that connects while another is attached.
pub const REJECT_REASON: &str = "another consumer is already connected";

const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves consumers until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: ServerConfig,
    server: Arc<StreamServer>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!("camstream listening on ws://{}", config.bind_addr);

    serve(listener, config, server, running).await;
    Ok(())
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind port 0 and learn the
/// actual address before serving.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    server: Arc<StreamServer>,
    running: Arc<AtomicBool>,
) {
    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout lets the loop notice the shutdown flag even when
        // nobody is connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("incoming connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let srv = Arc::clone(&server);
                tokio::spawn(async move {
                    handle_consumer_session(stream, peer_addr, cfg, srv).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_consumer_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    server: Arc<StreamServer>,
) {
    match run_session(stream, peer_addr, config, server).await {
        Ok(()) => info!("session {peer_addr} closed"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one consumer connection from handshake to teardown.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    server: Arc<StreamServer>,
) -> anyhow::Result<()> {
    // ── Step 1: Handshake ─────────────────────────────────────────────────────
    let subprotocol = config.subprotocol.clone();
    let mut ws = accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            Ok(negotiate_subprotocol(req, resp, &subprotocol))
        },
    )
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    // ── Step 2: Claim the consumer slot ───────────────────────────────────────
    let session = match server.lifecycle().attach(peer_addr) {
        Ok(session) => session,
        Err(e) => {
            warn!("rejecting consumer {peer_addr}: {e}");
            let reason = match e {
                LifecycleError::SecondConnectionRejected { .. } => REJECT_REASON.to_string(),
                other => other.to_string(),
            };
            reject(&mut ws, reason).await;
            return Ok(());
        }
    };

    // ── Step 3: Run both halves until one ends ────────────────────────────────
    let (ws_tx, mut ws_rx) = ws.split();
    let mut sink = WsFrameSink::new(ws_tx);

    let exit = tokio::select! {
        exit = drain_queue(server.queue(), server.lifecycle(), session, &mut sink) => Some(exit),
        () = receive_messages(&mut ws_rx, &server, peer_addr) => None,
    };

    match exit {
        Some(DrainExit::TransportFailed(e)) => debug!("session {peer_addr}: send half ended: {e}"),
        Some(DrainExit::Detached) => debug!("session {peer_addr}: detached"),
        None => debug!("session {peer_addr}: consumer stopped sending"),
    }

    // ── Step 4: Release the slot ──────────────────────────────────────────────
    server.lifecycle().detach(session);
    if let Err(e) = sink.close().await {
        debug!("session {peer_addr}: close failed: {e}");
    }
    Ok(())
}

/// Echoes `subprotocol` in the handshake response if the consumer offered it.
///
/// Browsers abort the connection when they request a subprotocol and the
/// server does not confirm it.
fn negotiate_subprotocol(req: &Request, mut resp: Response, subprotocol: &str) -> Response {
    let offered = req
        .headers()
        .get(SUBPROTOCOL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|list| list.split(',').any(|p| p.trim() == subprotocol))
        .unwrap_or(false);

    if offered {
        match HeaderValue::from_str(subprotocol) {
            Ok(value) => {
                resp.headers_mut().insert(SUBPROTOCOL_HEADER, value);
            }
            Err(e) => warn!("configured subprotocol is not a valid header value: {e}"),
        }
    }
    resp
}

/// Closes a session that may not become the consumer.
async fn reject(ws: &mut WebSocketStream<TcpStream>, reason: String) {
    let frame = CloseFrame {
        code: CloseCode::Policy,
        reason: reason.into(),
    };
    if let Err(e) = ws.close(Some(frame)).await {
        debug!("failed to send close frame: {e}");
        return;
    }
    // Give the peer a moment to acknowledge the close.
    let _ = timeout(Duration::from_secs(1), async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
}

/// Forwards consumer messages to the server until the stream ends.
async fn receive_messages(ws_rx: &mut WsSource, server: &StreamServer, peer_addr: SocketAddr) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(WsMessage::Binary(bytes)) => {
                server.deliver(InboundMessage::Binary(bytes));
            }
            Ok(WsMessage::Text(text)) => {
                server.deliver(InboundMessage::Text(text));
            }
            Ok(WsMessage::Close(_)) => {
                debug!("session {peer_addr}: close frame received");
                break;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
            Err(WsError::ConnectionClosed | WsError::Protocol(_)) => {
                debug!("session {peer_addr}: connection closed");
                break;
            }
            Err(e) => {
                warn!("session {peer_addr}: receive error: {e}");
                break;
            }
        }
    }
}

// ── FrameSink over a WebSocket ────────────────────────────────────────────────

/// Sends [`WireFrame`]s as WebSocket messages.
///
/// `SinkExt::send` flushes, so a successful return means tungstenite has
/// written the whole frame to the socket.
pub struct WsFrameSink {
    tx: WsSink,
}

impl WsFrameSink {
    fn new(tx: WsSink) -> Self {
        Self { tx }
    }

    async fn close(&mut self) -> Result<(), WsError> {
        self.tx.close().await
    }
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_frame(&mut self, frame: Arc<WireFrame>) -> Result<(), TransportError> {
        self.tx
            .send(to_ws_message(&frame))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
                other => TransportError::SendFailed(other.to_string()),
            })
    }
}

fn to_ws_message(frame: &WireFrame) -> WsMessage {
    match frame {
        WireFrame::Text(text) => WsMessage::Text(text.clone()),
        WireFrame::Binary(bytes) => WsMessage::Binary(bytes.clone()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
