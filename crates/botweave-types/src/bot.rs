//! Bot identity as seen by backend registration hooks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The bot that is registering (or has registered) a backend.
///
/// Passed to `pre_bot_register` / `post_bot_register`. Deliberately a
/// snapshot: the hooks are a boundary, not a handle into the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInfo {
    /// Orchestrator-assigned bot ID.
    pub id: Uuid,
    /// Display name of the bot.
    pub name: String,
}

impl BotInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
        }
    }
}
