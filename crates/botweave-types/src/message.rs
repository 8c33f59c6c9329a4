//! Messaging domain types shared between the core and transports.
//!
//! `InboundMessage` is what a transport feeds into event dispatch;
//! `DraftMessage` is a message yet to be sent, produced by a transport's
//! composer capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message received by a transport, normalized for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// UUIDv7 message ID, assigned by the core.
    pub id: Uuid,
    /// Transport-specific origin (nick, user ID, server name, ...).
    pub origin: String,
    /// Where the message was addressed (channel, user, ...).
    pub target: String,
    /// A single line of plaintext content.
    pub line: String,
    /// When the transport received the message.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Create an inbound message stamped with a fresh ID and the current time.
    pub fn new(
        origin: impl Into<String>,
        target: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            origin: origin.into(),
            target: target.into(),
            line: line.into(),
            received_at: Utc::now(),
        }
    }
}

/// A draft message: one or more plaintext lines addressed to a target,
/// not yet sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftMessage {
    /// The target of the message (user, channel, etc).
    pub target: String,
    /// Plaintext lines, sent in order.
    pub lines: Vec<String>,
}

impl DraftMessage {
    /// Draft a single line.
    pub fn line(target: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            lines: vec![line.into()],
        }
    }

    /// Draft multiple lines, preserving order.
    pub fn lines<I, S>(target: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: target.into(),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// Name of a composite content type supported by a transport
/// (e.g. "embed" on platforms with rich messages).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKind(pub String);

impl CompositeKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_gets_id_and_timestamp() {
        let a = InboundMessage::new("alice", "#general", "hello");
        let b = InboundMessage::new("alice", "#general", "hello");
        assert_ne!(a.id, b.id);
        assert_eq!(a.line, "hello");
    }

    #[test]
    fn test_draft_lines_preserve_order() {
        let draft = DraftMessage::lines("#ops", ["one", "two", "three"]);
        assert_eq!(draft.lines, vec!["one", "two", "three"]);
        assert_eq!(draft.target, "#ops");
    }

    #[test]
    fn test_draft_single_line() {
        let draft = DraftMessage::line("bob", "hi");
        assert_eq!(draft.lines.len(), 1);
    }
}
