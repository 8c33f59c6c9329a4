use thiserror::Error;

/// Errors surfaced by the backend coordination core.
///
/// Lifecycle and throttle-admission violations are returned synchronously
/// to the caller. Handler failures during dispatch are *not* represented
/// here -- they are captured per-handler and reported on the dispatcher's
/// diagnostics channel instead of propagating.
#[derive(Debug, Error)]
pub enum BackendError {
    /// `start` was called while the backend was not stopped.
    #[error("backend is already running")]
    AlreadyRunning,

    /// A stop scope (or other running-only operation) was requested while
    /// the backend was not running.
    #[error("backend is not running")]
    NotRunning,

    /// The operation is not supported by this backend, either because the
    /// transport lacks the capability or because throttling makes a
    /// synchronous send impossible right now.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The bounded outbound queue is full. Distinct from `NotSupported` so
    /// callers can decide to retry asynchronously rather than fail.
    #[error("outbound queue full (capacity {capacity})")]
    Backpressure { capacity: usize },

    /// A transport operation failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BackendError {
    /// Wrap a transport-side failure, rendering its full error chain.
    pub fn transport(error: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{error:#}"))
    }
}
