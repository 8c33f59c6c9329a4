//! Shared domain types for botweave backends.
//!
//! This crate contains the types that cross the boundary between the
//! coordination core and concrete transport implementations: error enums,
//! message drafts, comms handles, and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, and
//! thiserror.

pub mod bot;
pub mod comms;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
