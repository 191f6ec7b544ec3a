//! `StreamServer`: the one object the capture pipeline and the command
//! bridge talk to.
//!
//! The facade owns the [`WriteQueue`], the [`ConnectionLifecycle`], and the
//! [`MessageRouter`], and exposes them through a small, synchronous API:
//!
//! ```text
//! capture pipeline ──submit_*──▶ StreamServer ──▶ WriteQueue ──▶ drain loop ──▶ consumer
//! command bridge  ◀──handlers── StreamServer ◀── deliver ◀── session receive task
//! ```
//!
//! Every `submit_*` call returns immediately.  Use the returned
//! [`WriteHandle`] (or the `_with` variant's callback) to learn when the
//! message actually reached the transport.
//!
//! # Thread safety
//!
//! `StreamServer` is `Send + Sync`; share it with `Arc`.  All methods take
//! `&self`.

use std::sync::Arc;

use camstream_core::lifecycle::Transition;
use camstream_core::{list_formats, ConnectionState, FormatDescriptor, InboundMessage, LifecycleError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::lifecycle::ConnectionLifecycle;
use super::router::{Dispatch, MessageRouter};
use super::write_queue::{OutboundMessage, WriteError, WriteHandle, WriteQueue};
use crate::domain::ServerConfig;

/// Errors returned by the facade's submit and lifecycle methods.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Write(#[from] WriteError),

    /// A control message could not be converted to JSON.
    #[error("failed to serialise control message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// The streaming server facade.
#[derive(Debug)]
pub struct StreamServer {
    queue: Arc<WriteQueue>,
    lifecycle: Arc<ConnectionLifecycle>,
    router: MessageRouter,
}

impl StreamServer {
    /// Creates a server in the `Idle` state with an empty queue bounded by
    /// `config.max_pending_writes`.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            queue: Arc::new(WriteQueue::new(config.max_pending_writes)),
            lifecycle: Arc::new(ConnectionLifecycle::new()),
            router: MessageRouter::new(),
        }
    }

    /// The pixel formats the capture pipeline can produce, ordered by code.
    pub fn formats(&self) -> Vec<FormatDescriptor> {
        list_formats()
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Queues a structured control message, sent as one JSON text frame.
    ///
    /// # Errors
    ///
    /// [`ServerError::Serialize`] if `message` cannot be converted to JSON,
    /// [`ServerError::Write`] if the queue is full.
    pub fn submit_control<T: Serialize>(&self, message: &T) -> Result<WriteHandle, ServerError> {
        let value = serde_json::to_value(message)?;
        Ok(self.queue.enqueue(OutboundMessage::json(value))?)
    }

    /// Like [`submit_control`](Self::submit_control), running `on_sent` after
    /// delivery.
    pub fn submit_control_with<T, F>(&self, message: &T, on_sent: F) -> Result<WriteHandle, ServerError>
    where
        T: Serialize,
        F: FnOnce() + Send + 'static,
    {
        let value = serde_json::to_value(message)?;
        Ok(self.queue.enqueue(OutboundMessage::json(value).on_sent(on_sent))?)
    }

    /// Queues one binary payload.
    pub fn submit_frame(&self, bytes: Vec<u8>) -> Result<WriteHandle, ServerError> {
        Ok(self.queue.enqueue(OutboundMessage::binary(bytes))?)
    }

    /// Like [`submit_frame`](Self::submit_frame), running `on_sent` after
    /// delivery.
    pub fn submit_frame_with<F>(&self, bytes: Vec<u8>, on_sent: F) -> Result<WriteHandle, ServerError>
    where
        F: FnOnce() + Send + 'static,
    {
        Ok(self.queue.enqueue(OutboundMessage::binary(bytes).on_sent(on_sent))?)
    }

    /// Queues several binary parts delivered together as one binary message.
    ///
    /// Typically a one-byte plane tag followed by the plane data.
    pub fn submit_frames(&self, parts: Vec<Vec<u8>>) -> Result<WriteHandle, ServerError> {
        Ok(self.queue.enqueue(OutboundMessage::binary_batch(parts))?)
    }

    /// Like [`submit_frames`](Self::submit_frames), running `on_sent` after
    /// delivery.
    pub fn submit_frames_with<F>(
        &self,
        parts: Vec<Vec<u8>>,
        on_sent: F,
    ) -> Result<WriteHandle, ServerError>
    where
        F: FnOnce() + Send + 'static,
    {
        Ok(self
            .queue
            .enqueue(OutboundMessage::binary_batch(parts).on_sent(on_sent))?)
    }

    /// Queues a plain text message.
    pub fn submit_text(&self, text: impl Into<String>) -> Result<WriteHandle, ServerError> {
        Ok(self.queue.enqueue(OutboundMessage::text(text))?)
    }

    /// Like [`submit_text`](Self::submit_text), running `on_sent` after
    /// delivery.
    pub fn submit_text_with<F>(&self, text: impl Into<String>, on_sent: F) -> Result<WriteHandle, ServerError>
    where
        F: FnOnce() + Send + 'static,
    {
        Ok(self.queue.enqueue(OutboundMessage::text(text).on_sent(on_sent))?)
    }

    /// Queues messages of any kinds atomically and contiguously.
    pub fn submit_batch(&self, messages: Vec<OutboundMessage>) -> Result<Vec<WriteHandle>, ServerError> {
        Ok(self.queue.enqueue_batch(messages)?)
    }

    /// Discards every undelivered message.  Returns how many were dropped.
    pub fn cancel_all_writes(&self) -> usize {
        self.queue.cancel_all()
    }

    /// Messages waiting for delivery, including the one in flight.
    pub fn pending_writes(&self) -> usize {
        self.queue.len()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Enables transmission (and, the first time, accepting a consumer).
    pub fn start(&self) -> Transition {
        self.lifecycle.start()
    }

    /// Suspends transmission.  Submissions keep being buffered.
    ///
    /// # Errors
    ///
    /// [`ServerError::Lifecycle`] if the server is `Idle` or `Closed`.
    pub fn pause(&self) -> Result<Transition, ServerError> {
        self.lifecycle.pause().map_err(|e| {
            warn!("pause refused: {e}");
            ServerError::from(e)
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Registers the handler for binary messages, replacing any previous one.
    pub fn on_binary_message<F>(&self, handler: F)
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        debug!("binary message handler registered");
        self.router.set_binary_handler(Arc::new(handler));
    }

    /// Registers the handler for text messages, replacing any previous one.
    pub fn on_text_message<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        debug!("text message handler registered");
        self.router.set_text_handler(Arc::new(handler));
    }

    /// Routes a message received from the consumer to its handler.
    pub fn deliver(&self, message: InboundMessage) -> Dispatch {
        self.router.dispatch(message)
    }

    // ── Internals shared with the infrastructure layer ────────────────────────

    pub fn queue(&self) -> &Arc<WriteQueue> {
        &self.queue
    }

    pub fn lifecycle(&self) -> &Arc<ConnectionLifecycle> {
        &self.lifecycle
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        let discarded = self.queue.cancel_all();
        if discarded > 0 {
            info!("server dropped with {discarded} undelivered write(s)");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
