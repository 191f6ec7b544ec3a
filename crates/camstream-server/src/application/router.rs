//! Routes inbound consumer messages to the registered handler.
//!
//! There is one handler slot per inbound kind (binary and text).
//! Registering a handler replaces whatever was in the slot; a message that
//! arrives while its slot is empty is dropped.

use std::sync::{Arc, RwLock};

use camstream_core::InboundMessage;
use tracing::{debug, trace};

/// Handler for binary messages from the consumer.
pub type BinaryHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

/// Handler for text messages from the consumer.
pub type TextHandler = Arc<dyn Fn(String) + Send + Sync + 'static>;

/// What happened to a dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler was invoked.
    Delivered,
    /// No handler was registered for the message's kind.
    Dropped,
}

/// Single-slot-per-kind message router.
#[derive(Default)]
pub struct MessageRouter {
    binary: RwLock<Option<BinaryHandler>>,
    text: RwLock<Option<TextHandler>>,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("binary", &slot_filled(&self.binary))
            .field("text", &slot_filled(&self.text))
            .finish()
    }
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the binary handler, replacing any previous one.
    pub fn set_binary_handler(&self, handler: BinaryHandler) {
        *self.binary.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Installs the text handler, replacing any previous one.
    pub fn set_text_handler(&self, handler: TextHandler) {
        *self.text.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn clear_binary_handler(&self) {
        *self.binary.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn clear_text_handler(&self) {
        *self.text.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Invokes the handler registered for `message`'s kind.
    ///
    /// The handler runs on the caller's task, after the slot lock has been
    /// released, so it may re-register handlers.
    pub fn dispatch(&self, message: InboundMessage) -> Dispatch {
        let kind = message.kind_str();
        let len = message.len();
        let delivered = match message {
            InboundMessage::Binary(bytes) => {
                let handler = self.binary.read().unwrap_or_else(|e| e.into_inner()).clone();
                match handler {
                    Some(h) => {
                        h(bytes);
                        true
                    }
                    None => false,
                }
            }
            InboundMessage::Text(text) => {
                let handler = self.text.read().unwrap_or_else(|e| e.into_inner()).clone();
                match handler {
                    Some(h) => {
                        h(text);
                        true
                    }
                    None => false,
                }
            }
        };

        if delivered {
            trace!("dispatched {kind} message ({len} bytes)");
            Dispatch::Delivered
        } else {
            debug!("dropped {kind} message ({len} bytes): no handler registered");
            Dispatch::Dropped
        }
    }
}

fn slot_filled<T>(slot: &RwLock<Option<T>>) -> bool {
    slot.read().map(|s| s.is_some()).unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_without_handler_drops() {
        let router = MessageRouter::new();
        assert_eq!(
            router.dispatch(InboundMessage::Binary(vec![1, 2])),
            Dispatch::Dropped
        );
        assert_eq!(
            router.dispatch(InboundMessage::Text("hi".into())),
            Dispatch::Dropped
        );
    }

    #[test]
    fn test_binary_message_reaches_binary_handler_only() {
        // Arrange
        let router = MessageRouter::new();
        let binary = Arc::new(Mutex::new(Vec::new()));
        let text_calls = Arc::new(Mutex::new(0));
        let b = Arc::clone(&binary);
        router.set_binary_handler(Arc::new(move |bytes: Vec<u8>| b.lock().unwrap().push(bytes)));
        let t = Arc::clone(&text_calls);
        router.set_text_handler(Arc::new(move |_: String| *t.lock().unwrap() += 1));

        // Act
        let result = router.dispatch(InboundMessage::Binary(vec![0xAB]));

        // Assert
        assert_eq!(result, Dispatch::Delivered);
        assert_eq!(*binary.lock().unwrap(), vec![vec![0xAB]]);
        assert_eq!(*text_calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_second_registration_replaces_first() {
        // Arrange
        let router = MessageRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s1 = Arc::clone(&seen);
        router.set_text_handler(Arc::new(move |t: String| s1.lock().unwrap().push(format!("first:{t}"))));
        let s2 = Arc::clone(&seen);
        router.set_text_handler(Arc::new(move |t: String| s2.lock().unwrap().push(format!("second:{t}"))));

        // Act
        router.dispatch(InboundMessage::Text("x".into()));

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec!["second:x".to_string()]);
    }

    #[test]
    fn test_cleared_slot_drops_messages() {
        let router = MessageRouter::new();
        router.set_binary_handler(Arc::new(|_: Vec<u8>| {}));
        router.clear_binary_handler();
        assert_eq!(
            router.dispatch(InboundMessage::Binary(vec![])),
            Dispatch::Dropped
        );
    }

    #[test]
    fn test_cleared_text_slot_drops_text_but_keeps_binary() {
        // Arrange
        let router = MessageRouter::new();
        let texts = Arc::new(Mutex::new(0));
        let t = Arc::clone(&texts);
        router.set_text_handler(Arc::new(move |_: String| *t.lock().unwrap() += 1));
        router.set_binary_handler(Arc::new(|_: Vec<u8>| {}));

        // Act
        router.clear_text_handler();

        // Assert
        assert_eq!(
            router.dispatch(InboundMessage::Text("ignored".into())),
            Dispatch::Dropped
        );
        assert_eq!(*texts.lock().unwrap(), 0);
        assert_eq!(
            router.dispatch(InboundMessage::Binary(vec![1])),
            Dispatch::Delivered
        );
    }

    #[test]
    fn test_handler_may_replace_itself_during_dispatch() {
        // Arrange: the handler swaps in a new handler on first call
        let router = Arc::new(MessageRouter::new());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&router);
        let c = Arc::clone(&calls);
        router.set_text_handler(Arc::new(move |t: String| {
            c.lock().unwrap().push(format!("old:{t}"));
            let c2 = Arc::clone(&c);
            r.set_text_handler(Arc::new(move |t: String| c2.lock().unwrap().push(format!("new:{t}"))));
        }));

        // Act
        router.dispatch(InboundMessage::Text("1".into()));
        router.dispatch(InboundMessage::Text("2".into()));

        // Assert
        assert_eq!(*calls.lock().unwrap(), vec!["old:1", "new:2"]);
    }
}
