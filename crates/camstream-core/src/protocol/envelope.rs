//! Request/response envelope for consumer-issued commands.
//!
//! The consumer drives the device with small JSON requests sent as text
//! messages and matches replies by `id`:
//!
//! ```json
//! → {"request":"configure","id":7,"data":{"resolution":"1280x720","position":"back"}}
//! ← {"id":7,"data":{"width":1280,"height":720,"mirrored":false,"rotated":true}}
//! ```
//!
//! The `id` is opaque to the device: whatever JSON value the consumer sent is
//! echoed back unchanged.  A handler that produces no result replies with an
//! empty string so the consumer's pending promise still resolves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reasons a text message is not a valid request.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The text is not JSON, or lacks a string `request` or an `id`.
    #[error("malformed request envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A command sent by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Command name, e.g. `"need-frame"`.
    pub request: String,
    /// Correlation token echoed in the [`Response`].
    pub id: Value,
    /// Optional command argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// Parses a text message into a request.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] when the text is not a JSON object
    /// with a string `request` field and an `id` field.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The `id` of the request being answered.
    pub id: Value,
    /// Handler result, or `""` when the handler returned nothing.
    pub data: Value,
}

impl Response {
    /// Builds a reply for `id`, substituting `""` for a missing result.
    pub fn new(id: Value, data: Option<Value>) -> Self {
        Self {
            id,
            data: data.unwrap_or_else(|| Value::String(String::new())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
