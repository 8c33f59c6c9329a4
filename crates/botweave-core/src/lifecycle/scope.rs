//! Cancellation handle tied to a running backend.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A cancellation handle scoped to one backend run.
///
/// Created by `LifecycleController::new_stop_scope` while the backend is
/// running. Cancelling the scope (directly, or by stopping the backend)
/// ends work tied to it: tasks should select on [`StopScope::cancelled`]
/// or check [`StopScope::is_cancelled`] at safe points.
///
/// Cloning shares the same scope; cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct StopScope {
    id: Uuid,
    token: CancellationToken,
}

impl StopScope {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            id: Uuid::now_v7(),
            token,
        }
    }

    /// Unique identifier of this scope.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel this scope. The backend keeps running; only work tied to
    /// this scope ends.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until this scope is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The underlying cancellation token, for `select!`-style callers.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
