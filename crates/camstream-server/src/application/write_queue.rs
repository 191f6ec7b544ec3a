//! Ordered outbound write queue with per-message completion.
//!
//! Every payload the capture pipeline or the command bridge submits lands
//! here first.  The queue:
//!
//! - keeps messages in submission order (FIFO),
//! - lets a whole batch be appended under one lock so no concurrent
//!   submitter can interleave with it,
//! - hands messages one at a time to the drain loop (see
//!   [`crate::application::drain`]) and never has more than one in flight,
//! - fires a message's completion exactly once, only after the transport has
//!   confirmed the send,
//! - discards everything on [`WriteQueue::cancel_all`] without firing any
//!   discarded completion.
//!
//! # The in-flight message stays at the head
//!
//! When the drain loop takes a message it is *not* removed; it is only marked
//! as in flight.  It is removed when the send is confirmed
//! ([`WriteQueue::complete`]).  If the send fails, the mark is dropped
//! ([`WriteQueue::release`]) and the same message is retried first on the
//! next connection.  Messages are therefore never lost to a broken
//! connection, only to `cancel_all`.
//!
//! # Completion handles
//!
//! Each enqueue returns a [`WriteHandle`], a future that resolves to
//! `Ok(())` on delivery and to `Err(WriteError::Cancelled)` when the message
//! is discarded.  A completion closure can be attached as well; it runs on
//! the drain task right before the handle resolves.
//!
//! # Locking
//!
//! The queue state is behind a `std::sync::Mutex` that is only ever held for
//! list manipulation, never across an `.await` and never while a completion
//! closure runs.  Completion closures may therefore submit new messages.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use camstream_core::{Payload, PayloadKind, WireFrame};
use thiserror::Error;
use tokio::sync::{oneshot, watch, Notify};
use tracing::{debug, info, warn};

/// A zero-argument callback invoked once a message has been delivered.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors reported for individual writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The queue is at its configured bound; nothing was queued.
    #[error("write queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// The message was discarded by `cancel_all` before delivery.
    #[error("write was cancelled before delivery")]
    Cancelled,

    /// The payload could not be encoded into a wire frame.
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

// ── Outbound message ──────────────────────────────────────────────────────────

/// A payload submitted for delivery, with an optional completion callback.
pub struct OutboundMessage {
    payload: Payload,
    completion: Option<Completion>,
}

impl OutboundMessage {
    /// Wraps a payload without a completion callback.
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            completion: None,
        }
    }

    /// A JSON control message.
    pub fn json(value: serde_json::Value) -> Self {
        Self::new(Payload::Json(value))
    }

    /// A single binary payload.
    pub fn binary(bytes: Vec<u8>) -> Self {
        Self::new(Payload::Binary(bytes))
    }

    /// Several binary parts sent as one binary message.
    pub fn binary_batch(parts: Vec<Vec<u8>>) -> Self {
        Self::new(Payload::BinaryBatch(parts))
    }

    /// A plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Payload::Text(text.into()))
    }

    /// Attaches a callback that runs once the message has been delivered.
    ///
    /// The callback runs on the drain task.  It must not block; hand long
    /// work off to another task.
    pub fn on_sent(mut self, completion: impl FnOnce() + Send + 'static) -> Self {
        self.completion = Some(Box::new(completion));
        self
    }

    pub fn kind(&self) -> PayloadKind {
        self.payload.kind()
    }
}

impl fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundMessage")
            .field("kind", &self.payload.kind())
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

// ── Write handle ──────────────────────────────────────────────────────────────

/// Future resolving when a queued message is delivered or discarded.
///
/// Dropping the handle does not cancel the write.
#[derive(Debug)]
pub struct WriteHandle {
    id: u64,
    rx: oneshot::Receiver<()>,
}

impl WriteHandle {
    /// Queue-assigned id of the message, increasing in submission order.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for WriteHandle {
    type Output = Result<(), WriteError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender is dropped without sending when the entry is discarded.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| WriteError::Cancelled))
    }
}

// ── Queue internals ───────────────────────────────────────────────────────────

struct Entry {
    id: u64,
    kind: PayloadKind,
    frame: Arc<WireFrame>,
    completion: Option<Completion>,
    delivered: oneshot::Sender<()>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Entry>,
    /// Id of the head entry while the drain loop is sending it.
    in_flight: Option<u64>,
    next_id: u64,
    /// Bumped by every `cancel_all`.
    generation: u64,
}

/// A message whose payload has already been turned into a wire frame.
struct Encoded {
    kind: PayloadKind,
    frame: WireFrame,
    completion: Option<Completion>,
}

impl Encoded {
    fn from_message(message: OutboundMessage) -> Result<Self, WriteError> {
        let kind = message.payload.kind();
        let frame = message
            .payload
            .into_frame()
            .map_err(|e| WriteError::Encode(e.to_string()))?;
        Ok(Self {
            kind,
            frame,
            completion: message.completion,
        })
    }
}

impl QueueState {
    /// Appends one entry at the tail.  Capacity is checked by the caller.
    fn push(&mut self, encoded: Encoded) -> WriteHandle {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let (tx, rx) = oneshot::channel();
        debug!(
            "queued write {id}: {} ({} bytes)",
            encoded.kind.as_str(),
            encoded.frame.len()
        );
        self.pending.push_back(Entry {
            id,
            kind: encoded.kind,
            frame: Arc::new(encoded.frame),
            completion: encoded.completion,
            delivered: tx,
        });
        WriteHandle { id, rx }
    }
}

/// The message the drain loop is currently sending.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub id: u64,
    pub kind: PayloadKind,
    pub frame: Arc<WireFrame>,
    /// Cancellation generation at the time the send started.
    pub generation: u64,
}

/// Thread-safe FIFO of outbound messages.
///
/// Share it with `Arc`: submitters call the `enqueue*` methods from any
/// thread or task while one drain loop consumes it.
pub struct WriteQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    work_ready: Notify,
    cancelled: watch::Sender<u64>,
}

impl fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("WriteQueue")
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl WriteQueue {
    /// Creates an empty queue holding at most `capacity` messages.
    ///
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (cancelled, _) = watch::channel(0);
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
            work_ready: Notify::new(),
            cancelled,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages not yet delivered, including the one in flight.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` while the drain loop is sending the head message.
    pub fn has_in_flight(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Appends one message to the tail.  Never blocks.
    ///
    /// # Errors
    ///
    /// - [`WriteError::QueueFull`] if the queue is at capacity.
    /// - [`WriteError::Encode`] if the payload cannot be encoded.
    pub fn enqueue(&self, message: OutboundMessage) -> Result<WriteHandle, WriteError> {
        let encoded = Encoded::from_message(message)?;
        let handle = {
            let mut state = self.lock();
            self.ensure_room(&state, 1)?;
            state.push(encoded)
        };
        self.work_ready.notify_one();
        Ok(handle)
    }

    /// Appends all `messages` atomically, preserving their relative order.
    ///
    /// Either every message is queued (contiguously) or none is.  Returns the
    /// handles in the same order as `messages`.
    ///
    /// # Errors
    ///
    /// - [`WriteError::QueueFull`] if the whole batch does not fit.
    /// - [`WriteError::Encode`] if any payload cannot be encoded.
    pub fn enqueue_batch(
        &self,
        messages: Vec<OutboundMessage>,
    ) -> Result<Vec<WriteHandle>, WriteError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        // Encode outside the lock: JSON serialisation and batch concatenation
        // can be expensive for large frames.
        let encoded = messages
            .into_iter()
            .map(Encoded::from_message)
            .collect::<Result<Vec<_>, _>>()?;

        let handles: Vec<WriteHandle> = {
            let mut state = self.lock();
            self.ensure_room(&state, encoded.len())?;
            encoded.into_iter().map(|e| state.push(e)).collect()
        };

        self.work_ready.notify_one();
        Ok(handles)
    }

    /// Discards every undelivered message, including the one in flight.
    ///
    /// After this returns the queue is empty, every discarded handle resolves
    /// to [`WriteError::Cancelled`], and no discarded completion will ever
    /// run.  A drain loop blocked on the in-flight send is woken and abandons
    /// it.  Returns the number of messages discarded.
    pub fn cancel_all(&self) -> usize {
        let discarded: Vec<Entry> = {
            let mut state = self.lock();
            state.in_flight = None;
            state.generation = state.generation.wrapping_add(1);
            self.cancelled.send_replace(state.generation);
            state.pending.drain(..).collect()
        };

        let count = discarded.len();
        // Dropping the entries drops their completions uncalled and their
        // oneshot senders, which resolves the handles as cancelled.
        drop(discarded);

        if count > 0 {
            info!("cancelled {count} pending write(s)");
        }
        count
    }

    fn ensure_room(&self, state: &QueueState, incoming: usize) -> Result<(), WriteError> {
        if state.pending.len() + incoming > self.capacity {
            warn!(
                "write queue full: {} pending, {incoming} submitted, capacity {}",
                state.pending.len(),
                self.capacity
            );
            return Err(WriteError::QueueFull {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    // ── Drain-loop side ───────────────────────────────────────────────────────

    /// Marks the head message as in flight and returns it.
    ///
    /// Returns `None` if the queue is empty or a message is already in
    /// flight (single-writer discipline).
    pub fn begin_next(&self) -> Option<InFlight> {
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return None;
        }
        let generation = state.generation;
        let head = state.pending.front()?;
        let job = InFlight {
            id: head.id,
            kind: head.kind,
            frame: Arc::clone(&head.frame),
            generation,
        };
        state.in_flight = Some(job.id);
        Some(job)
    }

    /// Confirms delivery of in-flight message `id`: removes it, runs its
    /// completion, then resolves its handle.
    ///
    /// Returns `false` (and runs nothing) if `id` is no longer in flight,
    /// which happens when `cancel_all` discarded it mid-send.
    pub fn complete(&self, id: u64) -> bool {
        let entry = {
            let mut state = self.lock();
            if state.in_flight != Some(id) {
                return false;
            }
            state.in_flight = None;
            match state.pending.front() {
                Some(head) if head.id == id => state.pending.pop_front(),
                _ => None,
            }
        };

        let Some(entry) = entry else {
            return false;
        };

        debug!("write {} delivered", entry.id);
        if let Some(completion) = entry.completion {
            completion();
        }
        // The receiver may have been dropped; delivery still counts.
        let _ = entry.delivered.send(());
        true
    }

    /// Clears the in-flight mark for `id`, leaving the message at the head
    /// so it is sent again later.  No-op if `id` is not in flight.
    pub fn release(&self, id: u64) {
        let mut state = self.lock();
        if state.in_flight == Some(id) {
            state.in_flight = None;
            debug!("write {id} returned to head of queue");
        }
    }

    /// Resolves when new messages may be available.
    pub async fn wait_for_work(&self) {
        self.work_ready.notified().await;
    }

    /// Subscribes to the cancellation generation bumped by `cancel_all`.
    pub fn subscribe_cancellations(&self) -> watch::Receiver<u64> {
        self.cancelled.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking completion cannot poison this lock (completions run
        // outside it), so recovering the guard is sound.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
