//! Request/response dispatch for commands sent by the consumer.
//!
//! The consumer page drives the device with JSON text messages:
//!
//! ```json
//! {"request": "need-frame", "id": 12, "data": null}
//! ```
//!
//! [`RequestController`] installs itself as the server's text handler,
//! parses each message, calls the handler registered under `request`, and
//! submits `{"id": <same id>, "data": <result>}` back through the write
//! queue.  A handler that returns `None` is answered with `""`.
//!
//! Handlers come in two flavours:
//!
//! - **sync** handlers run inline on the session receive task and must be
//!   quick;
//! - **async** handlers return a future that is spawned on the Tokio runtime,
//!   so slow work (e.g. reconfiguring the camera) never stalls the receive
//!   loop.
//!
//! If both flavours are registered under the same name, the async one wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use camstream_core::protocol::{Request, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::server::StreamServer;

/// A handler that answers immediately.
pub type SyncHandler = Arc<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static>;

/// A handler whose answer is computed by a spawned future.
pub type AsyncHandler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Option<Value>> + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// Each request name can be registered once per flavour.
    #[error("a handler for request '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// What the controller did with one text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A sync handler ran and its reply was queued.
    Replied,
    /// An async handler was spawned; it queues its reply when done.
    Spawned,
    /// No handler is registered under the request name.
    Unknown,
    /// The text was not a request envelope.
    Malformed,
    /// An async handler matched but could not be spawned.
    NotSpawned,
}

/// Routes consumer requests to named handlers and queues the replies.
pub struct RequestController {
    server: Weak<StreamServer>,
    sync_handlers: Mutex<HashMap<String, SyncHandler>>,
    async_handlers: Mutex<HashMap<String, AsyncHandler>>,
}

impl std::fmt::Debug for RequestController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sync: Vec<String> = lock(&self.sync_handlers).keys().cloned().collect();
        let mut r#async: Vec<String> = lock(&self.async_handlers).keys().cloned().collect();
        sync.sort();
        r#async.sort();
        f.debug_struct("RequestController")
            .field("sync", &sync)
            .field("async", &r#async)
            .finish()
    }
}

impl RequestController {
    /// Creates a controller that replies through `server`.
    ///
    /// The controller holds the server weakly; call
    /// [`install`](Self::install) to start receiving text messages.
    pub fn new(server: &Arc<StreamServer>) -> Arc<Self> {
        Arc::new(Self {
            server: Arc::downgrade(server),
            sync_handlers: Mutex::new(HashMap::new()),
            async_handlers: Mutex::new(HashMap::new()),
        })
    }

    /// Makes this controller the server's text message handler.
    pub fn install(self: &Arc<Self>) {
        let Some(server) = self.server.upgrade() else {
            return;
        };
        let controller = Arc::clone(self);
        server.on_text_message(move |text| {
            controller.handle_text(&text);
        });
    }

    /// Registers a sync handler for `name`.
    ///
    /// # Errors
    ///
    /// [`ControllerError::AlreadyRegistered`] if a sync handler already
    /// exists for `name`.  The first registration is kept.
    pub fn register<F>(&self, name: &str, handler: F) -> Result<(), ControllerError>
    where
        F: Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        let mut handlers = lock(&self.sync_handlers);
        if handlers.contains_key(name) {
            return Err(ControllerError::AlreadyRegistered(name.to_string()));
        }
        handlers.insert(name.to_string(), Arc::new(handler));
        debug!("registered request handler '{name}'");
        Ok(())
    }

    /// Registers an async handler for `name`.
    ///
    /// # Errors
    ///
    /// [`ControllerError::AlreadyRegistered`] if an async handler already
    /// exists for `name`.
    pub fn register_async<F, Fut>(&self, name: &str, handler: F) -> Result<(), ControllerError>
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        let mut handlers = lock(&self.async_handlers);
        if handlers.contains_key(name) {
            return Err(ControllerError::AlreadyRegistered(name.to_string()));
        }
        let boxed: AsyncHandler = Arc::new(move |data| handler(data).boxed());
        handlers.insert(name.to_string(), boxed);
        debug!("registered async request handler '{name}'");
        Ok(())
    }

    /// Parses and dispatches one text message from the consumer.
    pub fn handle_text(&self, text: &str) -> RequestOutcome {
        let request = match Request::parse(text) {
            Ok(r) => r,
            Err(e) => {
                warn!("ignoring text message that is not a request: {e}");
                return RequestOutcome::Malformed;
            }
        };
        let Request { request: name, id, data } = request;

        // Look up with the locks released before any handler runs.
        let async_handler = lock(&self.async_handlers).get(&name).cloned();
        if let Some(handler) = async_handler {
            let runtime = match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle,
                Err(e) => {
                    error!("cannot run async request '{name}' outside a Tokio runtime: {e}");
                    return RequestOutcome::NotSpawned;
                }
            };
            let server = self.server.clone();
            let fut = handler(data);
            debug!("spawning async request '{name}'");
            runtime.spawn(async move {
                let result = fut.await;
                reply(&server, &name, id, result);
            });
            return RequestOutcome::Spawned;
        }

        let sync_handler = lock(&self.sync_handlers).get(&name).cloned();
        if let Some(handler) = sync_handler {
            let result = handler(data);
            reply(&self.server, &name, id, result);
            return RequestOutcome::Replied;
        }

        debug!("no handler for request '{name}'");
        RequestOutcome::Unknown
    }
}

fn reply(server: &Weak<StreamServer>, name: &str, id: Value, result: Option<Value>) {
    let Some(server) = server.upgrade() else {
        debug!("server gone, dropping reply to '{name}'");
        return;
    };
    if let Err(e) = server.submit_control(&Response::new(id, result)) {
        warn!("failed to queue reply to '{name}': {e}");
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
