//! Coordination core for botweave chat backends.
//!
//! A concrete transport (IRC, Discord, ...) implements the capability
//! traits in [`backend::transport`]; everything a backend shares --
//! event subscription and dispatch, cancellable lifecycle scopes, and
//! outbound throttling -- lives here and is composed by
//! [`backend::Backend`].

pub mod backend;
pub mod event;
pub mod lifecycle;
pub mod testing;
pub mod throttle;
