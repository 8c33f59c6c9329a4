//! Read-only handles for channels and users resolved by a transport.
//!
//! These are snapshots, not live proxies: the core hands them to callers
//! without transferring ownership of any transport-side state.

use serde::{Deserialize, Serialize};

/// A channel known to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    /// Transport-unique channel identifier.
    pub id: String,
    /// Human-friendly name, when the transport distinguishes one.
    pub name: Option<String>,
}

/// A user known to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHandle {
    /// Transport-unique user identifier.
    pub id: String,
    /// Human-friendly name, when the transport distinguishes one.
    pub name: Option<String>,
    /// Whether this user is the connected bot itself.
    pub is_self: bool,
    /// Whether the user is currently reachable. Users are considered
    /// around until proven gone on platforms that do not broadcast
    /// disconnects.
    pub online: bool,
}
