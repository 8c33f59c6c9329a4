//! Capability traits a concrete transport implements.
//!
//! Each messaging platform (IRC, Discord, ...) implements [`Transport`]
//! plus whichever capability sub-traits it supports. A capability
//! accessor returning `None` is the explicit "not implemented by this
//! backend" signal -- the core never substitutes silent no-ops.

use async_trait::async_trait;
use botweave_types::bot::BotInfo;
use botweave_types::comms::{ChannelHandle, UserHandle};
use botweave_types::error::BackendError;
use botweave_types::message::{CompositeKind, DraftMessage};

/// Core transport trait. One instance per connected platform account.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport identifier (e.g. "irc", "discord").
    fn id(&self) -> &str;

    /// Establish the connection. Long-running receive loops should be
    /// spawned under stop scopes obtained from the owning backend.
    async fn connect(&self) -> anyhow::Result<()>;

    /// Tear down the connection.
    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Outbound adapter for sending messages, if this transport can send.
    fn outbound(&self) -> Option<&dyn Outbound>;

    /// Directory adapter for channel/user lookups, if supported.
    fn directory(&self) -> Option<&dyn Directory>;

    /// Composer adapter for building draft messages, if supported.
    fn composer(&self) -> Option<&dyn MessageComposer>;

    /// Called before a bot registers this backend. Returning `true`
    /// vetoes the registration.
    fn pre_bot_register(&self, _bot: &BotInfo) -> bool {
        false
    }

    /// Called after a bot has registered this backend.
    fn post_bot_register(&self, _bot: &BotInfo) {}
}

/// Send messages through a transport.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send a single line of text to a target (user, channel, etc).
    async fn send_text(&self, target: &str, text: &str) -> anyhow::Result<()>;

    /// Non-suspending send, for callers that cannot await.
    ///
    /// Transports without a synchronous path keep the default, which
    /// fails with `NotSupported` instead of pretending to have sent.
    fn send_text_sync(&self, _target: &str, _text: &str) -> Result<(), BackendError> {
        Err(BackendError::NotSupported(
            "synchronous send not implemented by this transport".to_string(),
        ))
    }
}

/// Resolve channel and user addresses to read-only handles.
pub trait Directory: Send + Sync {
    /// Look up a channel by address or identifier.
    fn channel(&self, addr: &str) -> Option<ChannelHandle>;

    /// Look up a user by address or identifier.
    fn user(&self, addr: &str) -> Option<UserHandle>;
}

/// Build draft messages in the transport's native shape.
pub trait MessageComposer: Send + Sync {
    /// Construct a draft message from plaintext lines.
    fn compose_lines(&self, target: &str, lines: &[String]) -> DraftMessage;

    /// Composite content types this transport supports.
    fn composite_kinds(&self) -> Vec<CompositeKind> {
        Vec::new()
    }
}
