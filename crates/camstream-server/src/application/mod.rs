//! Application layer for camstream-server.
//!
//! This layer holds the streaming logic proper.  It knows nothing about
//! sockets: outbound frames leave through the [`drain::FrameSink`] trait and
//! inbound messages arrive through [`server::StreamServer::deliver`].
//!
//! # Modules
//!
//! - [`write_queue`]: the ordered, bounded outbound queue and its completion
//!   protocol.
//! - [`drain`]: the per-session loop that moves queued messages to a sink.
//! - [`lifecycle`]: the shared, observable connection state machine.
//! - [`router`]: binary/text handler slots for inbound messages.
//! - [`server`]: the `StreamServer` facade tying the above together.
//! - [`controller`]: request/response dispatch on top of text messages.
//! - [`frame_publisher`]: on-demand publishing of two-plane video frames.

pub mod controller;
pub mod drain;
pub mod frame_publisher;
pub mod lifecycle;
pub mod router;
pub mod server;
pub mod write_queue;

pub use controller::{ControllerError, RequestController, RequestOutcome};
pub use drain::{drain_queue, DrainExit, FrameSink, TransportError};
pub use frame_publisher::{CaptureInfo, FramePublisher, FrameRequest};
pub use lifecycle::{ConnectionLifecycle, LifecycleSnapshot};
pub use router::{Dispatch, MessageRouter};
pub use server::{ServerError, StreamServer};
pub use write_queue::{OutboundMessage, WriteError, WriteHandle, WriteQueue};
