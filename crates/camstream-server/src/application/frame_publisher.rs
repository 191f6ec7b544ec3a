//! Pull-based publishing of bi-planar video frames.
//!
//! The capture pipeline pushes every new frame with
//! [`FramePublisher::push_planes`], but frames only go out when the consumer
//! asks for one (`need-frame`).  This keeps a slow consumer from being
//! flooded: at most one frame is in the write queue at any time.
//!
//! A frame is sent as two binary messages, each a one-byte plane tag
//! followed by the plane data:
//!
//! ```text
//! [0x00][ Y plane ... ]
//! [0x01][ UV plane ... ]
//! ```
//!
//! While those two messages are queued the publisher holds a *sending lock*.
//! The lock is released when both completions have fired.  If they have not
//! fired after `stale_send_after` (e.g. the consumer went away mid-frame),
//! the next request invalidates the lock and sends anyway.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use camstream_core::protocol::PlaneTag;
use serde::Serialize;
use tracing::{debug, warn};

use super::server::StreamServer;
use super::write_queue::OutboundMessage;

/// Geometry of the frames being captured, reported to the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureInfo {
    pub width: u32,
    pub height: u32,
    pub mirrored: bool,
    pub rotated: bool,
}

/// Result of a consumer frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    /// Both planes were queued.
    Sent,
    /// No frame is buffered yet; the next pushed frame will be sent.
    Deferred,
    /// A previous frame is still being delivered.
    Busy,
}

#[derive(Debug)]
struct SendInProgress {
    seq: u64,
    started: Instant,
    planes_left: u8,
}

#[derive(Debug, Default)]
struct PublisherState {
    luma: Option<Vec<u8>>,
    chroma: Option<Vec<u8>>,
    need_frame: bool,
    sending: Option<SendInProgress>,
    next_seq: u64,
    info: CaptureInfo,
}

#[derive(Debug)]
struct Shared {
    server: Weak<StreamServer>,
    stale_send_after: Duration,
    state: Mutex<PublisherState>,
}

/// Buffers the latest frame and sends it on demand.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Debug, Clone)]
pub struct FramePublisher {
    shared: Arc<Shared>,
}

impl FramePublisher {
    pub fn new(server: &Arc<StreamServer>, stale_send_after: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                server: Arc::downgrade(server),
                stale_send_after,
                state: Mutex::new(PublisherState::default()),
            }),
        }
    }

    /// Stores the newest frame, replacing any unsent one.  Sends it right
    /// away if the consumer is waiting for a frame.
    ///
    /// Returns `true` if the frame was queued for sending.
    pub fn push_planes(&self, luma: Vec<u8>, chroma: Vec<u8>) -> bool {
        let mut state = self.shared.lock();
        state.luma = Some(luma);
        state.chroma = Some(chroma);
        if !state.need_frame {
            return false;
        }
        self.send_locked(state) == FrameRequest::Sent
    }

    /// Handles the consumer's request for the next frame.
    pub fn request_frame(&self) -> FrameRequest {
        let mut state = self.shared.lock();
        if state.luma.is_none() || state.chroma.is_none() {
            state.need_frame = true;
            debug!("frame requested before one was captured, deferring");
            return FrameRequest::Deferred;
        }
        self.send_locked(state)
    }

    /// Discards every queued write and the buffered frame.
    ///
    /// Used when the capture pipeline is reconfigured and buffered frames no
    /// longer match the new geometry.
    pub fn clear(&self) {
        if let Some(server) = self.shared.server.upgrade() {
            server.cancel_all_writes();
        }
        let mut state = self.shared.lock();
        state.luma = None;
        state.chroma = None;
        state.need_frame = false;
        // The cancelled planes' completions will never fire.
        state.sending = None;
    }

    pub fn set_capture_info(&self, info: CaptureInfo) {
        self.shared.lock().info = info;
    }

    pub fn capture_info(&self) -> CaptureInfo {
        self.shared.lock().info
    }

    /// `true` while a frame is queued and not yet confirmed.
    pub fn is_sending(&self) -> bool {
        self.shared.lock().sending.is_some()
    }

    /// Sends the buffered frame if the sending lock allows it.
    fn send_locked(&self, mut state: MutexGuard<'_, PublisherState>) -> FrameRequest {
        if let Some(sending) = &state.sending {
            if sending.started.elapsed() < self.shared.stale_send_after {
                return FrameRequest::Busy;
            }
            warn!(
                "invalidating frame sending lock after {} ms",
                self.shared.stale_send_after.as_millis()
            );
            state.sending = None;
        }

        let (Some(luma), Some(chroma)) = (state.luma.take(), state.chroma.take()) else {
            state.need_frame = true;
            return FrameRequest::Deferred;
        };

        let seq = state.next_seq;
        state.next_seq = state.next_seq.wrapping_add(1);
        state.need_frame = false;
        state.sending = Some(SendInProgress {
            seq,
            started: Instant::now(),
            planes_left: 2,
        });
        drop(state);

        let Some(server) = self.shared.server.upgrade() else {
            self.shared.abandon(seq);
            return FrameRequest::Busy;
        };

        let luma_len = luma.len();
        let chroma_len = chroma.len();
        let messages = vec![
            self.plane_message(PlaneTag::Luma, luma, seq),
            self.plane_message(PlaneTag::Chroma, chroma, seq),
        ];
        match server.submit_batch(messages) {
            Ok(_) => {
                debug!("frame {seq} queued (Y {luma_len} bytes, UV {chroma_len} bytes)");
                FrameRequest::Sent
            }
            Err(e) => {
                warn!("failed to queue frame {seq}: {e}");
                self.shared.abandon(seq);
                FrameRequest::Busy
            }
        }
    }

    fn plane_message(&self, tag: PlaneTag, data: Vec<u8>, seq: u64) -> OutboundMessage {
        let shared = Arc::downgrade(&self.shared);
        OutboundMessage::binary_batch(vec![tag.header(), data]).on_sent(move || {
            if let Some(shared) = shared.upgrade() {
                shared.plane_sent(seq);
            }
        })
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Completion of one plane of frame `seq`.
    fn plane_sent(&self, seq: u64) {
        let mut state = self.lock();
        let Some(sending) = state.sending.as_mut() else {
            return;
        };
        if sending.seq != seq {
            // A late completion from a frame whose lock was invalidated.
            return;
        }
        sending.planes_left = sending.planes_left.saturating_sub(1);
        if sending.planes_left == 0 {
            debug!("frame {seq} delivered");
            state.sending = None;
            state.luma = None;
            state.chroma = None;
            state.need_frame = false;
        }
    }

    fn abandon(&self, seq: u64) {
        let mut state = self.lock();
        if matches!(&state.sending, Some(s) if s.seq == seq) {
            state.sending = None;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
