//! Messages received from the consumer.

/// A single message received from the consumer, tagged by frame kind.
///
/// Inbound messages are transient: they are built on receipt, handed to the
/// matching handler, and dropped.  Nothing retains or queues them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// A binary message.
    Binary(Vec<u8>),
    /// A UTF-8 text message.
    Text(String),
}

impl InboundMessage {
    /// Short lowercase name for logging.
    pub fn kind_str(&self) -> &'static str {
        match self {
            InboundMessage::Binary(_) => "binary",
            InboundMessage::Text(_) => "text",
        }
    }

    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        match self {
            InboundMessage::Binary(b) => b.len(),
            InboundMessage::Text(s) => s.len(),
        }
    }

    /// Returns `true` if the message carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
