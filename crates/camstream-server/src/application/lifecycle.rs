//! Shared, observable wrapper around the connection state machine.
//!
//! [`Lifecycle`] in `camstream-core` is a plain value.  The server needs to
//! mutate it from several places (the facade's `start`/`pause`, the accept
//! loop's `attach`/`detach`) and the drain loop needs to *wait* for it to
//! allow transmission.  [`ConnectionLifecycle`] provides both: a mutex for
//! the mutations and a `tokio::sync::watch` channel that publishes a
//! [`LifecycleSnapshot`] after every change.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use camstream_core::lifecycle::{Consumer, Transition};
use camstream_core::{ConnectionState, Lifecycle, LifecycleError, SessionId};
use tokio::sync::watch;
use tracing::info;

/// Point-in-time view of the lifecycle, as published to watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: ConnectionState,
    pub consumer: Option<Consumer>,
}

impl LifecycleSnapshot {
    /// `true` if `session` is the attached consumer.
    pub fn is_attached(&self, session: SessionId) -> bool {
        matches!(self.consumer, Some(c) if c.session == session)
    }

    /// `true` if queued messages may be sent to `session` right now.
    pub fn is_transmitting_to(&self, session: SessionId) -> bool {
        self.state == ConnectionState::Running && self.is_attached(session)
    }
}

/// Thread-safe connection lifecycle with change notification.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    machine: Mutex<Lifecycle>,
    changes: watch::Sender<LifecycleSnapshot>,
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionLifecycle {
    /// Creates a lifecycle in the `Idle` state.
    pub fn new() -> Self {
        let machine = Lifecycle::new();
        let (changes, _) = watch::channel(snapshot_of(&machine));
        Self {
            machine: Mutex::new(machine),
            changes,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state()
    }

    /// Current state and consumer.
    pub fn snapshot(&self) -> LifecycleSnapshot {
        *self.changes.borrow()
    }

    /// Enables transmission.  See [`Lifecycle::start`].
    pub fn start(&self) -> Transition {
        let mut machine = self.lock();
        let transition = machine.start();
        self.publish(&machine, transition);
        transition
    }

    /// Suspends transmission.  See [`Lifecycle::pause`].
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidTransition`] from `Idle` or `Closed`.
    pub fn pause(&self) -> Result<Transition, LifecycleError> {
        let mut machine = self.lock();
        let transition = machine.pause()?;
        self.publish(&machine, transition);
        Ok(transition)
    }

    /// Binds a newly connected consumer.  See [`Lifecycle::attach`].
    ///
    /// # Errors
    ///
    /// [`LifecycleError::SecondConnectionRejected`] or
    /// [`LifecycleError::NotStarted`].
    pub fn attach(&self, peer: SocketAddr) -> Result<SessionId, LifecycleError> {
        let mut machine = self.lock();
        let (session, transition) = machine.attach(peer)?;
        info!("consumer {peer} attached (session {session})");
        self.publish(&machine, transition);
        Ok(session)
    }

    /// Releases the consumer bound to `session`.
    ///
    /// Returns `false` for a stale session that is no longer attached.
    pub fn detach(&self, session: SessionId) -> bool {
        let mut machine = self.lock();
        match machine.detach(session) {
            Some(transition) => {
                info!("consumer detached (session {session})");
                self.publish(&machine, transition);
                true
            }
            None => false,
        }
    }

    /// Subscribes to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.changes.subscribe()
    }

    /// Publishes the new snapshot.  Called with the machine lock held so
    /// watchers observe changes in the order they happened.
    fn publish(&self, machine: &Lifecycle, transition: Transition) {
        if transition.changed() {
            info!("connection state {} → {}", transition.from, transition.to);
        }
        self.changes.send_replace(snapshot_of(machine));
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn snapshot_of(machine: &Lifecycle) -> LifecycleSnapshot {
    LifecycleSnapshot {
        state: machine.state(),
        consumer: machine.consumer(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
