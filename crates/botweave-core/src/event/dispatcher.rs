//! Per-backend listener registry and fan-out.
//!
//! Invocation order is deterministic: per-kind listeners in registration
//! order, then global listeners in registration order, each handler at
//! most once per dispatch. The registry is snapshotted before iteration,
//! so a handler may register further listeners without affecting the
//! dispatch call it runs in.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use botweave_types::event::HandlerFailure;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::handler::EventHandler;

/// Buffer size for the diagnostics broadcast channel.
const DIAGNOSTICS_BUFFER: usize = 64;

/// Listener registry and dispatch fan-out for one backend.
pub struct EventDispatcher {
    /// Per-kind listeners, insertion order preserved within each kind.
    listeners: DashMap<String, Vec<Arc<dyn EventHandler>>>,
    /// Listeners invoked for every kind, insertion order preserved.
    global_listeners: Mutex<Vec<Arc<dyn EventHandler>>>,
    /// Captured handler failures. Publishing with no subscribers is a no-op.
    diagnostics: broadcast::Sender<HandlerFailure>,
    /// Optional per-handler timeout; none imposed by default.
    handler_timeout: Option<Duration>,
}

impl EventDispatcher {
    /// Create a dispatcher with no handler timeout.
    pub fn new() -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_BUFFER);
        Self {
            listeners: DashMap::new(),
            global_listeners: Mutex::new(Vec::new()),
            diagnostics,
            handler_timeout: None,
        }
    }

    /// Create a dispatcher that bounds each handler invocation.
    ///
    /// A handler exceeding the timeout is reported as a failure with
    /// `timed_out = true`; the dispatch call moves on to the next handler.
    pub fn with_handler_timeout(timeout: Duration) -> Self {
        Self {
            handler_timeout: Some(timeout),
            ..Self::new()
        }
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Registration is idempotent per (kind, handler): re-registering the
    /// same handler under the same kind is a silent no-op. Returns the
    /// handler unchanged so call sites can keep using it.
    pub fn listen(&self, kind: &str, handler: Arc<dyn EventHandler>) -> Arc<dyn EventHandler> {
        let mut entry = self.listeners.entry(kind.to_string()).or_default();
        if !entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            entry.push(Arc::clone(&handler));
            debug!(kind, count = entry.len(), "registered listener");
        }
        handler
    }

    /// Register `handler` for every dispatched kind.
    ///
    /// Idempotent per handler. Returns the handler unchanged.
    pub fn listen_all(&self, handler: Arc<dyn EventHandler>) -> Arc<dyn EventHandler> {
        let mut global = self
            .global_listeners
            .lock()
            .expect("global listener lock poisoned");
        if !global.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            global.push(Arc::clone(&handler));
            debug!(count = global.len(), "registered global listener");
        }
        handler
    }

    /// Dispatch an event to every matching handler, sequentially and in
    /// registration order.
    ///
    /// Handler failures are isolated: each is logged, broadcast on the
    /// diagnostics channel, and never aborts the remaining handlers or
    /// this call. `dispatch` itself never fails.
    pub async fn dispatch(&self, kind: &str, payload: &Value) {
        let batch = self.snapshot(kind);

        for (handler_index, handler) in batch.iter().enumerate() {
            let outcome = match self.handler_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, handler.handle(kind, payload)).await {
                        Ok(result) => result,
                        Err(_) => {
                            self.report_failure(kind, handler_index, "handler timed out", true);
                            continue;
                        }
                    }
                }
                None => handler.handle(kind, payload).await,
            };

            if let Err(error) = outcome {
                self.report_failure(kind, handler_index, &format!("{error:#}"), false);
            }
        }
    }

    /// Subscribe to captured handler failures.
    pub fn diagnostics(&self) -> broadcast::Receiver<HandlerFailure> {
        self.diagnostics.subscribe()
    }

    /// Number of listeners registered for `kind` (excluding globals).
    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners.get(kind).map_or(0, |v| v.len())
    }

    /// Number of global listeners.
    pub fn global_listener_count(&self) -> usize {
        self.global_listeners
            .lock()
            .expect("global listener lock poisoned")
            .len()
    }

    /// Ordered, deduplicated snapshot of the handlers for one dispatch.
    ///
    /// Cloned out of the registry up front -- never hold a registry guard
    /// across await.
    fn snapshot(&self, kind: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut batch = self
            .listeners
            .get(kind)
            .map(|v| v.clone())
            .unwrap_or_default();

        let global = self
            .global_listeners
            .lock()
            .expect("global listener lock poisoned");
        for handler in global.iter() {
            if !batch.iter().any(|h| Arc::ptr_eq(h, handler)) {
                batch.push(Arc::clone(handler));
            }
        }

        batch
    }

    fn report_failure(&self, kind: &str, handler_index: usize, error: &str, timed_out: bool) {
        warn!(kind, handler_index, error, timed_out, "event handler failed");
        let _ = self.diagnostics.send(HandlerFailure {
            kind: kind.to_string(),
            handler_index,
            error: error.to_string(),
            timed_out,
        });
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.listeners.len())
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
