//! # camstream-core
//!
//! Shared library for camstream containing the pixel-format catalog, the
//! payload types that travel over the consumer connection, and the pure
//! connection state machine.
//!
//! This crate is used by the streaming server and by anything that needs to
//! speak its wire contract (tests, tools).  It has zero dependencies on async
//! runtimes, network sockets, or capture hardware.
//!
//! # Architecture overview (for beginners)
//!
//! camstream moves live camera frames from a device to a single remote
//! consumer (usually a browser page) over a WebSocket, and carries control
//! requests back from the consumer to the device.
//!
//! This crate (`camstream-core`) is the shared foundation.  It defines:
//!
//! - **`catalog`** – The compiled-in list of pixel formats the capture
//!   pipeline can produce, advertised to the consumer during negotiation.
//!
//! - **`protocol`** – What a message *is*: outbound payloads (JSON, binary,
//!   binary batch, text), their encoded wire frames, inbound messages, the
//!   request/response envelope, and the plane tags that prefix frame data.
//!
//! - **`lifecycle`** – The Idle / Running / Paused / Closed state machine
//!   for the server's single consumer connection, with no I/O attached.

pub mod catalog;
pub mod lifecycle;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `camstream_core::Payload` instead of `camstream_core::protocol::payload::Payload`.
pub use catalog::{list_formats, FormatDescriptor};
pub use lifecycle::{ConnectionState, Lifecycle, LifecycleError, SessionId};
pub use protocol::inbound::InboundMessage;
pub use protocol::payload::{Payload, PayloadKind, WireFrame};
