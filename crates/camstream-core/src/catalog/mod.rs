//! Pixel-format catalog used for capability advertisement.
//!
//! The consumer asks which pixel formats the device can produce before it
//! configures its decoder.  The answer is a fixed, compiled-in table: the
//! server never validates or interprets these codes, it only surfaces them.

pub mod pixel_format;

use serde::Serialize;

pub use pixel_format::fourcc;
use pixel_format::PIXEL_FORMATS;

/// One advertised pixel format.
///
/// Serialises to `{"code": 875704438, "name": "kCVPixelFormatType_..."}` so the
/// list can be sent to the consumer as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    /// Numeric CoreVideo format identifier.
    pub code: u32,
    /// Human-readable constant name.
    pub name: &'static str,
}

impl FormatDescriptor {
    /// Renders the code the way CoreVideo documentation does.
    ///
    /// Four-character codes made of printable ASCII are shown quoted
    /// (`'420v'`); small legacy codes are shown as hex (`0x00000020`).
    pub fn display_code(&self) -> String {
        let bytes = self.code.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            let text: String = bytes.iter().map(|&b| b as char).collect();
            format!("'{text}'")
        } else {
            format!("{:#010x}", self.code)
        }
    }
}

/// Returns every supported pixel format, ordered by ascending code.
///
/// Pure and deterministic: two calls always return equal vectors.
///
/// # Example
///
/// ```rust
/// let formats = camstream_core::list_formats();
/// assert_eq!(formats[0].code, 1);
/// assert!(formats.windows(2).all(|w| w[0].code < w[1].code));
/// ```
pub fn list_formats() -> Vec<FormatDescriptor> {
    let mut formats: Vec<FormatDescriptor> = PIXEL_FORMATS
        .iter()
        .map(|&(code, name)| FormatDescriptor { code, name })
        .collect();
    formats.sort_unstable_by_key(|f| f.code);
    formats
}

/// Looks up the name of a single format code.
///
/// Returns `None` for codes outside the compiled-in set.
pub fn format_name(code: u32) -> Option<&'static str> {
    PIXEL_FORMATS
        .iter()
        .find(|&&(c, _)| c == code)
        .map(|&(_, name)| name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
