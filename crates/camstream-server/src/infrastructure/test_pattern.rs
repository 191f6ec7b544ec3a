//! Synthetic NV12 frame source.
//!
//! Stands in for a camera when the server runs with `--test-pattern`.  Each
//! frame is a diagonal luma gradient that scrolls by one step per frame, with
//! a slowly rotating chroma tint, so a consumer can see that frames are
//! arriving and in order.
//!
//! NV12 layout for a `W x H` frame:
//!
//! ```text
//! Y  plane: W * H bytes, one luma sample per pixel
//! UV plane: W * H / 2 bytes, interleaved U,V per 2x2 block
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::frame_publisher::{CaptureInfo, FramePublisher};
use crate::domain::config::TestPattern;

/// Builds frame number `index` of the pattern.
///
/// Returns `(luma, chroma)`.
pub fn generate_frame(pattern: TestPattern, index: u64) -> (Vec<u8>, Vec<u8>) {
    let width = pattern.width as usize;
    let height = pattern.height as usize;
    // Truncation is intended: the pattern wraps every 256 frames.
    let shift = index as u8;

    let mut luma = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            luma.push(((x + y) as u8).wrapping_add(shift));
        }
    }

    let tint_u = 128u8.wrapping_add(shift / 4);
    let tint_v = 128u8.wrapping_sub(shift / 4);
    let mut chroma = Vec::with_capacity(width * height / 2);
    for _ in 0..(width / 2) * (height / 2) {
        chroma.push(tint_u);
        chroma.push(tint_v);
    }

    (luma, chroma)
}

/// Pushes pattern frames into `publisher` at `pattern.fps` until `running`
/// is cleared.
pub async fn run_test_pattern(
    publisher: FramePublisher,
    pattern: TestPattern,
    running: Arc<AtomicBool>,
) {
    info!(
        "test pattern source: {}x{} @ {} fps",
        pattern.width, pattern.height, pattern.fps
    );
    publisher.set_capture_info(CaptureInfo {
        width: pattern.width,
        height: pattern.height,
        mirrored: false,
        rotated: false,
    });

    let mut ticker = interval(pattern.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut index = 0u64;
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        let (luma, chroma) = generate_frame(pattern, index);
        if publisher.push_planes(luma, chroma) {
            debug!("test pattern frame {index} sent on demand");
        }
        index = index.wrapping_add(1);
    }
    debug!("test pattern source stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
