//! Outbound send throttling.
//!
//! A saturating "heat" counter gates sends: each admitted send adds one
//! unit, and heat decays at the configured cooldown rate. Sends arriving
//! at the ceiling are queued FIFO (bounded) and drained by a background
//! task as budget returns.

mod controller;

pub use controller::{QueuedSend, ThrottleController};
