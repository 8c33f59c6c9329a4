//! Running/stopped state machine and the active-scope registry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use botweave_types::error::BackendError;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::scope::StopScope;

/// Lifecycle states of a backend.
///
/// `Starting` and `Stopping` are transitional; callers observe mostly
/// `Stopped` and `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Inner {
    state: LifecycleState,
    /// Root cancellation token for the current run. Present only between
    /// `start` and `stop`.
    root: Option<CancellationToken>,
}

/// Owns a backend's running/stopped state and its live stop scopes.
///
/// Every scope handed out by [`new_stop_scope`](Self::new_stop_scope)
/// holds a child of the current run's root token; `stop` cancels the root
/// and then *observes* each scope's removal (edge-triggered, bounded by a
/// grace period) before reporting the backend stopped.
pub struct LifecycleController {
    inner: Mutex<Inner>,
    scopes: Arc<DashMap<Uuid, StopScope>>,
    /// Signalled each time a watcher removes a scope from the registry.
    scope_removed: Arc<Notify>,
    stop_grace: Duration,
}

impl LifecycleController {
    /// Create a controller in the `Stopped` state.
    ///
    /// `stop_grace` bounds how long `stop` waits for scopes to acknowledge
    /// cancellation before forcing teardown.
    pub fn new(stop_grace: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Stopped,
                root: None,
            }),
            scopes: Arc::new(DashMap::new()),
            scope_removed: Arc::new(Notify::new()),
            stop_grace,
        }
    }

    /// Start the backend.
    ///
    /// Fails with `AlreadyRunning` unless currently `Stopped`. On success
    /// the controller is `Running` when this returns, and `on_loaded` has
    /// been spawned as a supervised task: it runs until it completes or
    /// the backend stops, whichever comes first.
    pub fn start<F>(&self, on_loaded: F) -> Result<(), BackendError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let root = {
            let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
            if inner.state != LifecycleState::Stopped {
                return Err(BackendError::AlreadyRunning);
            }
            inner.state = LifecycleState::Starting;

            let root = CancellationToken::new();
            inner.root = Some(root.clone());
            inner.state = LifecycleState::Running;
            root
        };

        debug!("backend lifecycle running");
        tokio::spawn(async move {
            tokio::select! {
                _ = root.cancelled() => {}
                _ = on_loaded => {}
            }
        });

        Ok(())
    }

    /// Allocate a new stop scope tied to the current run.
    ///
    /// Fails with `NotRunning` unless the controller is `Running`; no
    /// scope is created in that case. The scope appears in the active set
    /// immediately. Once cancelled -- individually or by `stop` -- a
    /// watcher task removes it from the set exactly once; removal is
    /// eventual, not synchronous with cancellation.
    pub fn new_stop_scope(&self) -> Result<StopScope, BackendError> {
        let child = {
            let inner = self.inner.lock().expect("lifecycle lock poisoned");
            if inner.state != LifecycleState::Running {
                return Err(BackendError::NotRunning);
            }
            inner
                .root
                .as_ref()
                .ok_or(BackendError::NotRunning)?
                .child_token()
        };

        let scope = StopScope::new(child);
        let id = scope.id();
        self.scopes.insert(id, scope.clone());
        debug!(scope_id = %id, active = self.scopes.len(), "opened stop scope");

        let scopes = Arc::clone(&self.scopes);
        let removed = Arc::clone(&self.scope_removed);
        let watched = scope.clone();
        tokio::spawn(async move {
            watched.cancelled().await;
            if scopes.remove(&id).is_some() {
                debug!(scope_id = %id, "stop scope cancelled and removed");
                removed.notify_waiters();
            }
        });

        Ok(scope)
    }

    /// Stop the backend, cancelling every live scope.
    ///
    /// Waits until all scopes report cancelled (their watchers have
    /// removed them) or the grace period elapses; stragglers are then
    /// force-cleared so the stopped invariant -- an empty scope set --
    /// always holds. Calling `stop` while already stopped is a no-op.
    pub async fn stop(&self) {
        let root = {
            let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
            if inner.state == LifecycleState::Stopped {
                return;
            }
            inner.state = LifecycleState::Stopping;
            inner.root.take()
        };

        if let Some(root) = root {
            root.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.stop_grace;
        loop {
            // Arm the notification before checking, so a removal between
            // the check and the wait is not lost.
            let notified = self.scope_removed.notified();
            if self.scopes.is_empty() {
                break;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(
                    remaining = self.scopes.len(),
                    "grace period elapsed; forcing scope teardown"
                );
                break;
            }
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }

        self.scopes.clear();
        let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
        inner.state = LifecycleState::Stopped;
        debug!("backend lifecycle stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().expect("lifecycle lock poisoned").state
    }

    /// Whether the backend is running.
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Number of live stop scopes.
    pub fn active_scope_count(&self) -> usize {
        self.scopes.len()
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .field("active_scopes", &self.scopes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
