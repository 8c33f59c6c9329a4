//! Event subscription and dispatch.
//!
//! Transports feed incoming events into [`EventDispatcher::dispatch`];
//! handlers registered with [`EventDispatcher::listen`] (per-kind) and
//! [`EventDispatcher::listen_all`] (every kind) run in registration order.

mod dispatcher;
mod handler;

pub use dispatcher::EventDispatcher;
pub use handler::{handler_fn, EventHandler};
