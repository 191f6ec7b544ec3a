//! Protocol module containing payload types, inbound messages, the
//! request/response envelope, and frame plane tags.

pub mod envelope;
pub mod inbound;
pub mod payload;
pub mod plane;

pub use envelope::{Request, Response};
pub use inbound::InboundMessage;
pub use payload::{Payload, PayloadKind, WireFrame};
pub use plane::PlaneTag;
