//! Infrastructure layer for camstream-server.
//!
//! Contains the I/O-facing components:
//!
//! - [`ws_server`]: the WebSocket accept loop and per-session tasks.
//! - [`test_pattern`]: a synthetic frame source for running without a camera.

pub mod test_pattern;
pub mod ws_server;

pub use test_pattern::{generate_frame, run_test_pattern};
pub use ws_server::{run_server, serve, WsFrameSink, REJECT_REASON};
