use std::net::SocketAddr;

use uuid::Uuid;

use super::{ConnectionState, LifecycleError, SessionId};

/// The consumer currently bound to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumer {
    pub session: SessionId,
    pub peer: SocketAddr,
}

/// A state change produced by a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    /// Returns `true` if the state actually changed.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// State machine for the server's single consumer connection.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    consumer: Option<Consumer>,
    /// Set by `pause()`, cleared only by `start()`.  Survives `Closed`.
    paused: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a lifecycle in the `Idle` state with no consumer.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            consumer: None,
            paused: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn consumer(&self) -> Option<Consumer> {
        self.consumer
    }

    /// Returns `true` when queued messages may be sent: the server is
    /// `Running` and a consumer is attached.
    pub fn is_transmitting(&self) -> bool {
        self.state == ConnectionState::Running && self.consumer.is_some()
    }

    /// Moves to `Running` from any state.  Calling it while already running
    /// is a no-op.
    pub fn start(&mut self) -> Transition {
        self.paused = false;
        self.move_to(ConnectionState::Running)
    }

    /// Moves `Running` to `Paused`.  Pausing while paused is a no-op.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidTransition`] from `Idle` or `Closed`.
    pub fn pause(&mut self) -> Result<Transition, LifecycleError> {
        match self.state {
            ConnectionState::Running | ConnectionState::Paused => {
                self.paused = true;
                Ok(self.move_to(ConnectionState::Paused))
            }
            from @ (ConnectionState::Idle | ConnectionState::Closed) => {
                Err(LifecycleError::InvalidTransition {
                    from,
                    action: "pause",
                })
            }
        }
    }

    /// Binds a newly connected consumer and returns its session id.
    ///
    /// Attaching after a disconnect (`Closed`) returns to the state the
    /// server was in before it: `Paused` if `pause()` was not followed by
    /// `start()`, otherwise `Running`.  Attaching while `Running` or `Paused`
    /// keeps the current state.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::SecondConnectionRejected`] if a consumer is already
    ///   attached.  The existing consumer is not affected.
    /// - [`LifecycleError::NotStarted`] while `Idle`.
    pub fn attach(&mut self, peer: SocketAddr) -> Result<(SessionId, Transition), LifecycleError> {
        if let Some(active) = self.consumer {
            return Err(LifecycleError::SecondConnectionRejected {
                active: active.peer,
            });
        }
        if self.state == ConnectionState::Idle {
            return Err(LifecycleError::NotStarted);
        }

        let session = Uuid::new_v4();
        self.consumer = Some(Consumer { session, peer });
        let transition = if self.state == ConnectionState::Closed {
            let resumed = if self.paused {
                ConnectionState::Paused
            } else {
                ConnectionState::Running
            };
            self.move_to(resumed)
        } else {
            self.move_to(self.state)
        };
        Ok((session, transition))
    }

    /// Releases the consumer identified by `session` and moves to `Closed`.
    ///
    /// Returns `None` when `session` is not the attached consumer (a stale
    /// notification from a connection that was already replaced).
    pub fn detach(&mut self, session: SessionId) -> Option<Transition> {
        match self.consumer {
            Some(c) if c.session == session => {
                self.consumer = None;
                Some(self.move_to(ConnectionState::Closed))
            }
            _ => None,
        }
    }

    fn move_to(&mut self, to: ConnectionState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
