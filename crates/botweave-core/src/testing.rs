//! In-memory transport for tests.
//!
//! `MemoryTransport` records every send instead of touching a network.
//! Used by this crate's own tests and useful for downstream transport and
//! bot test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use botweave_types::bot::BotInfo;
use botweave_types::comms::{ChannelHandle, UserHandle};
use botweave_types::error::BackendError;
use botweave_types::message::{CompositeKind, DraftMessage};

use crate::backend::transport::{Directory, MessageComposer, Outbound, Transport};

/// A transport that records sends in memory.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<(String, String)>>,
    channels: Mutex<HashMap<String, ChannelHandle>>,
    users: Mutex<HashMap<String, UserHandle>>,
    /// When set, every send fails with a transport error.
    failing: AtomicBool,
    /// When set, `pre_bot_register` vetoes registration.
    veto_registration: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, as (target, text) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent log lock poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent log lock poisoned").len()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `pre_bot_register` veto registration.
    pub fn set_veto_registration(&self, veto: bool) {
        self.veto_registration.store(veto, Ordering::SeqCst);
    }

    /// Seed a channel the directory can resolve.
    pub fn add_channel(&self, addr: &str, handle: ChannelHandle) {
        self.channels
            .lock()
            .expect("channel map lock poisoned")
            .insert(addr.to_string(), handle);
    }

    /// Seed a user the directory can resolve.
    pub fn add_user(&self, addr: &str, handle: UserHandle) {
        self.users
            .lock()
            .expect("user map lock poisoned")
            .insert(addr.to_string(), handle);
    }

    fn record(&self, target: &str, text: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("memory transport configured to fail");
        }
        self.sent
            .lock()
            .expect("sent log lock poisoned")
            .push((target.to_string(), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn id(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn Outbound> {
        Some(self)
    }

    fn directory(&self) -> Option<&dyn Directory> {
        Some(self)
    }

    fn composer(&self) -> Option<&dyn MessageComposer> {
        Some(self)
    }

    fn pre_bot_register(&self, _bot: &BotInfo) -> bool {
        self.veto_registration.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Outbound for MemoryTransport {
    async fn send_text(&self, target: &str, text: &str) -> anyhow::Result<()> {
        self.record(target, text)
    }

    fn send_text_sync(&self, target: &str, text: &str) -> Result<(), BackendError> {
        self.record(target, text).map_err(BackendError::transport)
    }
}

impl Directory for MemoryTransport {
    fn channel(&self, addr: &str) -> Option<ChannelHandle> {
        self.channels
            .lock()
            .expect("channel map lock poisoned")
            .get(addr)
            .cloned()
    }

    fn user(&self, addr: &str) -> Option<UserHandle> {
        self.users
            .lock()
            .expect("user map lock poisoned")
            .get(addr)
            .cloned()
    }
}

impl MessageComposer for MemoryTransport {
    fn compose_lines(&self, target: &str, lines: &[String]) -> DraftMessage {
        DraftMessage::lines(target, lines.iter().cloned())
    }

    fn composite_kinds(&self) -> Vec<CompositeKind> {
        vec![CompositeKind::new("plaintext")]
    }
}
