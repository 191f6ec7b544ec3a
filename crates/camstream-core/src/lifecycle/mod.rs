//! Connection lifecycle state machine.
//!
//! The server owns exactly one [`Lifecycle`].  It records whether the server
//! is allowed to transmit (`start` / `pause`) and which consumer, if any, is
//! attached.  This module is pure: it performs no I/O and has no notion of
//! time, so every transition can be tested directly.
//!
//! # States
//!
//! ```text
//!            start()               pause()
//!   Idle ───────────▶ Running ◀──────────────▶ Paused
//!                       │  ▲      start()        │
//!          consumer     │  │ attach() or         │ consumer
//!          disconnects  ▼  │ start()             ▼ disconnects
//!                      Closed ◀──────────────────┘
//! ```
//!
//! There is no explicit `stop`: `Closed` is reached only when the attached
//! consumer goes away.  Messages queued at that point are kept; they are sent
//! once a new consumer attaches and the state is `Running` again.
//!
//! A `pause()` outlives the disconnect: a consumer attaching from `Closed`
//! lands in `Paused` until `start()` is called.

mod machine;

pub use machine::{Consumer, Lifecycle, Transition};

use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;
use thiserror::Error;

/// Identifier assigned to each accepted consumer connection.
///
/// Used to ignore stale disconnect notifications from a session that has
/// already been replaced.
pub type SessionId = uuid::Uuid;

/// The server's connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Initial state: not started, consumers are refused.
    Idle,
    /// Accepting a consumer and transmitting queued messages.
    Running,
    /// Consumer stays bound but nothing is dequeued; submissions are buffered.
    Paused,
    /// The consumer disconnected; submissions are buffered.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Running => "running",
            ConnectionState::Paused => "paused",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle operations that were refused.
///
/// None of these are fatal: callers log them and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A consumer tried to connect while another one is attached.
    #[error("another consumer is already connected from {active}")]
    SecondConnectionRejected {
        /// Address of the consumer that keeps the slot.
        active: SocketAddr,
    },

    /// A consumer tried to connect before `start()` was ever called.
    #[error("server has not been started")]
    NotStarted,

    /// The requested transition does not exist from the current state.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        /// State at the time of the request.
        from: ConnectionState,
        /// The refused operation, e.g. `"pause"`.
        action: &'static str,
    },
}
