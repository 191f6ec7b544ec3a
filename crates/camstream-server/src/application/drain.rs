//! The drain loop: moves messages from the [`WriteQueue`] to the transport.
//!
//! One drain loop runs per consumer session.  It takes the head message,
//! sends it through a [`FrameSink`], waits for the sink to confirm, and only
//! then marks the message delivered and takes the next one.  At most one
//! message is ever in flight.
//!
//! The loop only sends while the lifecycle says the session may transmit
//! (`Running` with this session attached).  While paused it waits; when the
//! session is detached it returns.
//!
//! # Cancellation during a send
//!
//! `WriteQueue::cancel_all` may run while a send is awaiting the transport.
//! The loop races the send against the queue's cancellation generation and
//! abandons the send as soon as the generation moves.  The abandoned message
//! is never confirmed, so its completion never runs.

use std::sync::Arc;

use async_trait::async_trait;
use camstream_core::{SessionId, WireFrame};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::lifecycle::{ConnectionLifecycle, LifecycleSnapshot};
use super::write_queue::WriteQueue;

// ── Transport seam ────────────────────────────────────────────────────────────

/// Errors reported by a [`FrameSink`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer or the local socket closed the connection.
    #[error("transport closed")]
    Closed,

    /// The frame could not be written.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Anything that can deliver one frame to the consumer and confirm it.
///
/// `send_frame` must return only once the frame has been handed to the
/// transport, and must emit either the whole frame or nothing.
///
/// # Why a trait?
///
/// The WebSocket implementation lives in the infrastructure layer.  Keeping
/// the drain loop generic over this trait lets its tests use an in-memory or
/// mock sink without opening sockets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send {
    /// Sends `frame` and resolves once the transport has accepted it.
    async fn send_frame(&mut self, frame: Arc<WireFrame>) -> Result<(), TransportError>;
}

/// Why a drain loop ended.
#[derive(Debug)]
pub enum DrainExit {
    /// The session is no longer the attached consumer.
    Detached,
    /// The sink failed.  The message being sent stays at the head of the
    /// queue for the next session.
    TransportFailed(TransportError),
}

// ── In-flight guard ───────────────────────────────────────────────────────────

/// Returns the in-flight message to the head of the queue unless disarmed.
///
/// If the drain future is dropped mid-send (the session task was torn down),
/// `Drop` runs and the message is retried later instead of being stranded.
struct InFlightGuard<'a> {
    queue: &'a WriteQueue,
    id: u64,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(queue: &'a WriteQueue, id: u64) -> Self {
        Self {
            queue,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.release(self.id);
        }
    }
}

// ── Drain loop ────────────────────────────────────────────────────────────────

/// Sends queued messages to `sink` for as long as `session` stays attached.
///
/// Returns when the session is detached or the sink fails.  Completions of
/// delivered messages run on the task polling this future.
pub async fn drain_queue<S>(
    queue: &WriteQueue,
    lifecycle: &ConnectionLifecycle,
    session: SessionId,
    sink: &mut S,
) -> DrainExit
where
    S: FrameSink + ?Sized,
{
    let mut state_rx = lifecycle.subscribe();
    let mut cancel_rx = queue.subscribe_cancellations();

    loop {
        if !wait_until_transmitting(&mut state_rx, session).await {
            debug!("drain loop for session {session} stopping: detached");
            return DrainExit::Detached;
        }

        let Some(job) = queue.begin_next() else {
            // Nothing to send: sleep until new work or a lifecycle change.
            tokio::select! {
                _ = queue.wait_for_work() => {}
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return DrainExit::Detached;
                    }
                }
            }
            continue;
        };

        let guard = InFlightGuard::new(queue, job.id);
        let outcome = tokio::select! {
            biased;

            _ = cancel_rx.wait_for(|generation| *generation != job.generation) => None,
            sent = sink.send_frame(Arc::clone(&job.frame)) => Some(sent),
        };

        match outcome {
            None => {
                // cancel_all already removed the entry.
                guard.disarm();
                debug!("write {} abandoned by cancel_all", job.id);
            }
            Some(Ok(())) => {
                guard.disarm();
                queue.complete(job.id);
            }
            Some(Err(e)) => {
                drop(guard);
                warn!(
                    "send of write {} ({}) failed, kept for retry: {e}",
                    job.id,
                    job.kind.as_str()
                );
                return DrainExit::TransportFailed(e);
            }
        }
    }
}

/// Waits until `session` may transmit.  Returns `false` if the session is
/// detached instead.
async fn wait_until_transmitting(
    state_rx: &mut watch::Receiver<LifecycleSnapshot>,
    session: SessionId,
) -> bool {
    match state_rx
        .wait_for(|s| s.is_transmitting_to(session) || !s.is_attached(session))
        .await
    {
        Ok(snapshot) => snapshot.is_transmitting_to(session),
        Err(_) => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
