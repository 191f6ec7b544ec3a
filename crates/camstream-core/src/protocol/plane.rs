//! Plane tags that prefix video frame messages.
//!
//! Bi-planar YUV frames are sent as two binary messages, one per plane.  The
//! first byte of each message tells the consumer which plane follows:
//!
//! ```text
//! [0x00][ luma (Y) bytes ... ]
//! [0x01][ chroma (UV) bytes ... ]
//! ```

/// Identifies the plane carried by a frame message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaneTag {
    /// Luma plane.
    Luma = 0x00,
    /// Interleaved chroma plane.
    Chroma = 0x01,
}

impl PlaneTag {
    /// The tag byte as a one-byte header part.
    pub fn header(self) -> Vec<u8> {
        vec![self as u8]
    }

    /// Decodes a tag byte.
    ///
    /// Returns `None` for any byte other than `0x00` or `0x01`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(PlaneTag::Luma),
            0x01 => Some(PlaneTag::Chroma),
            _ => None,
        }
    }

    /// Splits a received frame message into its tag and plane data.
    ///
    /// Returns `None` if the message is empty or the tag is unknown.
    pub fn split(message: &[u8]) -> Option<(Self, &[u8])> {
        let (&first, rest) = message.split_first()?;
        Some((Self::from_byte(first)?, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        assert_eq!(PlaneTag::Luma.header(), vec![0x00]);
        assert_eq!(PlaneTag::Chroma.header(), vec![0x01]);
    }

    #[test]
    fn test_split_chroma_message() {
        let (tag, data) = PlaneTag::split(&[0x01, 9, 8]).unwrap();
        assert_eq!(tag, PlaneTag::Chroma);
        assert_eq!(data, &[9, 8]);
    }

    #[test]
    fn test_split_rejects_unknown_tag() {
        assert_eq!(PlaneTag::split(&[0x02, 1]), None);
    }

    #[test]
    fn test_split_rejects_empty_message() {
        assert_eq!(PlaneTag::split(&[]), None);
    }
}
