//! camstream-server library crate.
//!
//! This crate provides a single-consumer WebSocket server that streams live
//! camera frames and control messages from a device's capture pipeline to a
//! remote consumer (typically a browser), and routes the consumer's messages
//! back to application logic.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Capture pipeline / command bridge
//!         ↕
//! [camstream-server]
//!   ├── domain/           ServerConfig
//!   ├── application/      Write queue, drain loop, lifecycle manager,
//!   │                     message router, StreamServer facade,
//!   │                     request controller, frame publisher
//!   └── infrastructure/
//!         ├── ws_server/     WebSocket accept loop + per-session tasks
//!         └── test_pattern/  Synthetic NV12 frame source
//!         ↕
//! Consumer (binary frames + JSON text over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `camstream-core`.  It talks to the
//!   network only through the [`application::drain::FrameSink`] trait, so the
//!   queue and drain loop are tested without sockets.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: queueing, lifecycle, routing, and the public facade.
pub mod application;

/// Infrastructure layer: WebSocket server and synthetic frame source.
pub mod infrastructure;

pub use application::server::StreamServer;
pub use domain::ServerConfig;
