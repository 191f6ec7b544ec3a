//! Outbound payloads and their encoded wire frames.
//!
//! The capture pipeline and the command bridge hand the server one of four
//! payload kinds.  Before a payload is queued it is encoded into a
//! [`WireFrame`]: the unit the transport actually sends.  The transport only
//! knows two frame kinds (text and binary) and preserves message boundaries,
//! so the mapping is:
//!
//! ```text
//! Payload::Json(value)        → WireFrame::Text(serde_json::to_string(value))
//! Payload::Text(string)       → WireFrame::Text(string)
//! Payload::Binary(bytes)      → WireFrame::Binary(bytes)
//! Payload::BinaryBatch(parts) → WireFrame::Binary(parts concatenated)
//! ```
//!
//! A binary batch becomes *one* message because the consumer parses a frame
//! as a one-byte plane tag followed by the plane data; the tag and the data
//! are submitted as two parts but must arrive as a single message.

use serde_json::Value;

/// Discriminant of a [`Payload`], used in log lines instead of the contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    Binary,
    BinaryBatch,
    Text,
}

impl PayloadKind {
    /// Short lowercase name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadKind::Json => "json",
            PayloadKind::Binary => "binary",
            PayloadKind::BinaryBatch => "binary-batch",
            PayloadKind::Text => "text",
        }
    }
}

/// Application data submitted for delivery to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A structured control message, sent as a JSON text frame.
    Json(Value),
    /// A single opaque binary payload (e.g. an encoded frame).
    Binary(Vec<u8>),
    /// Several binary parts delivered together as one binary frame.
    BinaryBatch(Vec<Vec<u8>>),
    /// Plain text.
    Text(String),
}

impl Payload {
    /// Returns the kind of this payload.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Json(_) => PayloadKind::Json,
            Payload::Binary(_) => PayloadKind::Binary,
            Payload::BinaryBatch(_) => PayloadKind::BinaryBatch,
            Payload::Text(_) => PayloadKind::Text,
        }
    }

    /// Encodes the payload into the frame the transport will send.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if a JSON value cannot be serialised
    /// (for example a map with non-string keys built by hand).
    pub fn into_frame(self) -> Result<WireFrame, serde_json::Error> {
        Ok(match self {
            Payload::Json(value) => WireFrame::Text(serde_json::to_string(&value)?),
            Payload::Binary(bytes) => WireFrame::Binary(bytes),
            Payload::BinaryBatch(parts) => {
                // Pre-size the output so large video planes are copied once.
                let total: usize = parts.iter().map(Vec::len).sum();
                let mut joined = Vec::with_capacity(total);
                for part in parts {
                    joined.extend_from_slice(&part);
                }
                WireFrame::Binary(joined)
            }
            Payload::Text(text) => WireFrame::Text(text),
        })
    }
}

/// One discrete message on the consumer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
}

impl WireFrame {
    /// Number of payload bytes carried by this frame.
    pub fn len(&self) -> usize {
        match self {
            WireFrame::Text(s) => s.len(),
            WireFrame::Binary(b) => b.len(),
        }
    }

    /// Returns `true` if the frame carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` for binary frames.
    pub fn is_binary(&self) -> bool {
        matches!(self, WireFrame::Binary(_))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
