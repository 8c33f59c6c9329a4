//! Backend lifecycle: running/stopped state and cancellable stop scopes.
//!
//! Cancellation tokens form a tree: the controller owns a root token per
//! run, and every [`StopScope`] holds a child of it, so stopping the
//! backend cancels all live scopes at once.

mod controller;
mod scope;

pub use controller::{LifecycleController, LifecycleState};
pub use scope::StopScope;
