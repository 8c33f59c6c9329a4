//! Diagnostic event types for the dispatch pipeline.
//!
//! `HandlerFailure` is broadcast on the dispatcher's diagnostics channel
//! whenever a listener fails or times out. All fields are Clone + Send +
//! Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

/// A captured failure from a single dispatched handler.
///
/// Handler failures never abort sibling handlers or the dispatch call;
/// they are reported here so the orchestrator (or a logging subscriber)
/// can observe them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerFailure {
    /// The event kind being dispatched when the handler failed.
    pub kind: String,

    /// Zero-based position of the handler in the invocation order for
    /// this dispatch call.
    pub handler_index: usize,

    /// Rendered error message.
    pub error: String,

    /// True when the failure was a per-handler timeout rather than an
    /// error returned by the handler itself.
    pub timed_out: bool,
}
