//! The backend composition root.
//!
//! A [`Backend`] wires one transport together with the shared machinery:
//! event dispatcher, lifecycle controller, optional throttle controller,
//! and the reply mutator chain. Throttling is composed in, not inherited:
//! any transport capability set can be combined with any throttle
//! configuration.

pub mod mutator;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use botweave_types::bot::BotInfo;
use botweave_types::comms::{ChannelHandle, UserHandle};
use botweave_types::config::BackendConfig;
use botweave_types::error::BackendError;
use botweave_types::event::HandlerFailure;
use botweave_types::message::{CompositeKind, DraftMessage};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{EventDispatcher, EventHandler};
use crate::lifecycle::{LifecycleController, LifecycleState, StopScope};
use crate::throttle::ThrottleController;

pub use mutator::{MutateContext, MutatorChain, ReplyMutator};
pub use transport::{Directory, MessageComposer, Outbound, Transport};

/// One connected backend: a transport plus the shared coordination core.
pub struct Backend {
    identifier: String,
    transport: Arc<dyn Transport>,
    dispatcher: EventDispatcher,
    lifecycle: Arc<LifecycleController>,
    throttle: Option<Arc<ThrottleController>>,
    mutators: MutatorChain,
}

impl Backend {
    /// Build a backend around `transport`.
    ///
    /// The identifier is taken from the config or generated (UUIDv7).
    /// A config without a throttle section builds a backend that sends
    /// directly; `BackendConfig::throttled()` enables the default rates.
    /// Fails with `InvalidConfig` when a rate or duration field is out of
    /// range -- deserialized configs are not trusted.
    pub fn new(transport: Arc<dyn Transport>, config: BackendConfig) -> Result<Self, BackendError> {
        config.validate()?;
        let identifier = config
            .identifier
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let dispatcher = match config.handler_timeout_secs {
            Some(secs) => EventDispatcher::with_handler_timeout(Duration::from_secs_f64(secs)),
            None => EventDispatcher::new(),
        };
        let lifecycle = Arc::new(LifecycleController::new(Duration::from_secs_f64(
            config.stop_grace_secs,
        )));
        let throttle = match config.throttle {
            Some(c) => Some(Arc::new(ThrottleController::new(c)?)),
            None => None,
        };

        Ok(Self {
            identifier,
            transport,
            dispatcher,
            lifecycle,
            throttle,
            mutators: MutatorChain::new(),
        })
    }

    /// Unique identifier of this backend instance.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The composed transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The throttle controller, when this backend throttles.
    pub fn throttle(&self) -> Option<&Arc<ThrottleController>> {
        self.throttle.as_ref()
    }

    // -- events -------------------------------------------------------------

    /// Register a handler for events of `kind`. Idempotent; returns the
    /// handler unchanged.
    pub fn listen(&self, kind: &str, handler: Arc<dyn EventHandler>) -> Arc<dyn EventHandler> {
        self.dispatcher.listen(kind, handler)
    }

    /// Register a handler for every event kind. Idempotent.
    pub fn listen_all(&self, handler: Arc<dyn EventHandler>) -> Arc<dyn EventHandler> {
        self.dispatcher.listen_all(handler)
    }

    /// Dispatch an event to registered handlers. Called by the transport
    /// whenever something is received (or by tests to simulate traffic).
    pub async fn dispatch(&self, kind: &str, payload: &Value) {
        self.dispatcher.dispatch(kind, payload).await;
    }

    /// Subscribe to captured handler failures.
    pub fn diagnostics(&self) -> broadcast::Receiver<HandlerFailure> {
        self.dispatcher.diagnostics()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Whether the backend is running.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Number of live stop scopes.
    pub fn active_scope_count(&self) -> usize {
        self.lifecycle.active_scope_count()
    }

    /// Allocate a stop scope tied to this backend's lifecycle. The
    /// backend must be running.
    pub fn new_stop_scope(&self) -> Result<StopScope, BackendError> {
        self.lifecycle.new_stop_scope()
    }

    /// Start the backend: lifecycle first (spawning the throttle drain as
    /// supervised background work), then the transport connection.
    ///
    /// A transport connect failure rolls the lifecycle back to `Stopped`
    /// so the orchestrator can retry.
    pub async fn start(&self) -> Result<(), BackendError> {
        let lifecycle = Arc::clone(&self.lifecycle);
        let throttle = self.throttle.clone();
        let drain_transport = Arc::clone(&self.transport);
        self.lifecycle.start(async move {
            if let Some(throttle) = throttle {
                match lifecycle.new_stop_scope() {
                    Ok(scope) => throttle.run_drain(drain_transport, scope).await,
                    Err(error) => warn!(%error, "could not open throttle drain scope"),
                }
            }
        })?;

        match self.transport.connect().await {
            Ok(()) => {
                debug!(
                    backend = %self.identifier,
                    transport = self.transport.id(),
                    "backend started"
                );
                Ok(())
            }
            Err(error) => {
                self.lifecycle.stop().await;
                Err(BackendError::transport(error))
            }
        }
    }

    /// Stop the backend: disconnect the transport, then cancel every live
    /// scope and wait (bounded) for them to wind down. Idempotent.
    pub async fn stop(&self) -> Result<(), BackendError> {
        if self.lifecycle.state() == LifecycleState::Stopped {
            return Ok(());
        }
        if let Err(error) = self.transport.disconnect().await {
            warn!(backend = %self.identifier, %error, "transport disconnect failed");
        }
        self.lifecycle.stop().await;
        debug!(backend = %self.identifier, "backend stopped");
        Ok(())
    }

    // -- sending ------------------------------------------------------------

    /// Send `text` to `target`, applying the mutator chain and the
    /// throttle (when configured).
    pub async fn send(&self, target: &str, text: &str) -> Result<(), BackendError> {
        let outbound = self.require_outbound()?;
        let reply = self.mutate_reply(target, text.to_string());
        match &self.throttle {
            Some(throttle) => throttle.send_throttled(outbound, target, &reply).await,
            None => outbound
                .send_text(target, &reply)
                .await
                .map_err(BackendError::transport),
        }
    }

    /// Non-suspending send. Fails with `NotSupported` when throttling is
    /// enabled and heat is at the ceiling, or when the transport has no
    /// synchronous path.
    pub fn send_sync(&self, target: &str, text: &str) -> Result<(), BackendError> {
        let outbound = self.require_outbound()?;
        let reply = self.mutate_reply(target, text.to_string());
        match &self.throttle {
            Some(throttle) => throttle.send_sync(outbound, target, &reply),
            None => outbound.send_text_sync(target, &reply),
        }
    }

    fn require_outbound(&self) -> Result<&dyn Outbound, BackendError> {
        self.transport.outbound().ok_or_else(|| {
            BackendError::NotSupported("transport cannot send messages".to_string())
        })
    }

    // -- mutators -----------------------------------------------------------

    /// Append a reply mutator. Idempotent per instance.
    pub fn register_mutator(&self, mutator: Arc<dyn ReplyMutator>) {
        self.mutators.register(mutator);
    }

    /// Fold the mutator chain over `reply` for `target`.
    pub fn mutate_reply(&self, target: &str, reply: String) -> String {
        let cx = MutateContext {
            backend_id: &self.identifier,
            target,
        };
        self.mutators.apply(&cx, reply)
    }

    // -- registration hooks -------------------------------------------------

    /// Ask the transport whether it vetoes registration by `bot`.
    /// `true` means veto.
    pub fn pre_bot_register(&self, bot: &BotInfo) -> bool {
        self.transport.pre_bot_register(bot)
    }

    /// Notify the transport that `bot` has registered this backend.
    pub fn post_bot_register(&self, bot: &BotInfo) {
        self.transport.post_bot_register(bot);
    }

    // -- comms lookups ------------------------------------------------------

    /// Resolve a channel address. `Ok(None)` means not found;
    /// `NotSupported` means this transport has no directory at all.
    pub fn channel(&self, addr: &str) -> Result<Option<ChannelHandle>, BackendError> {
        Ok(self.require_directory()?.channel(addr))
    }

    /// Resolve a user address. Same contract as [`channel`](Self::channel).
    pub fn user(&self, addr: &str) -> Result<Option<UserHandle>, BackendError> {
        Ok(self.require_directory()?.user(addr))
    }

    fn require_directory(&self) -> Result<&dyn Directory, BackendError> {
        self.transport.directory().ok_or_else(|| {
            BackendError::NotSupported("transport has no channel/user directory".to_string())
        })
    }

    /// Build a draft message from plaintext lines via the transport's
    /// composer.
    pub fn construct_message_lines(
        &self,
        target: &str,
        lines: &[String],
    ) -> Result<DraftMessage, BackendError> {
        let composer = self.transport.composer().ok_or_else(|| {
            BackendError::NotSupported("transport cannot compose messages".to_string())
        })?;
        Ok(composer.compose_lines(target, lines))
    }

    /// Composite content types the transport supports. Empty when the
    /// transport has no composer.
    pub fn composite_kinds(&self) -> Vec<CompositeKind> {
        self.transport
            .composer()
            .map(|c| c.composite_kinds())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("identifier", &self.identifier)
            .field("transport", &self.transport.id())
            .field("state", &self.lifecycle.state())
            .field("throttled", &self.throttle.is_some())
            .field("mutators", &self.mutators.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::handler_fn;
    use crate::testing::MemoryTransport;
    use async_trait::async_trait;
    use botweave_types::config::ThrottleConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport with no capabilities at all.
    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        fn id(&self) -> &str {
            "null"
        }

        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn outbound(&self) -> Option<&dyn Outbound> {
            None
        }

        fn directory(&self) -> Option<&dyn Directory> {
            None
        }

        fn composer(&self) -> Option<&dyn MessageComposer> {
            None
        }
    }

    fn memory_backend(config: BackendConfig) -> (Arc<MemoryTransport>, Backend) {
        let transport = Arc::new(MemoryTransport::new());
        let backend = Backend::new(Arc::clone(&transport) as Arc<dyn Transport>, config)
            .expect("valid test config");
        (transport, backend)
    }

    #[tokio::test]
    async fn identifier_generated_when_unset() {
        let (_, a) = memory_backend(BackendConfig::default());
        let (_, b) = memory_backend(BackendConfig::default());
        assert_ne!(a.identifier(), b.identifier());

        let (_, named) = memory_backend(BackendConfig {
            identifier: Some("irc-libera".to_string()),
            ..BackendConfig::default()
        });
        assert_eq!(named.identifier(), "irc-libera");
    }

    #[tokio::test]
    async fn start_stop_round_trip() {
        let (_, backend) = memory_backend(BackendConfig::default());
        assert_eq!(backend.state(), LifecycleState::Stopped);

        backend.start().await.unwrap();
        assert!(backend.is_running());
        assert!(matches!(
            backend.start().await,
            Err(BackendError::AlreadyRunning)
        ));

        backend.stop().await.unwrap();
        assert_eq!(backend.state(), LifecycleState::Stopped);
        assert_eq!(backend.active_scope_count(), 0);

        // May start again after stopping.
        backend.start().await.unwrap();
        backend.stop().await.unwrap();
    }

    #[tokio::test]
    async fn scope_requires_running_backend() {
        let (_, backend) = memory_backend(BackendConfig::default());
        assert!(matches!(
            backend.new_stop_scope(),
            Err(BackendError::NotRunning)
        ));
        assert_eq!(backend.active_scope_count(), 0);

        backend.start().await.unwrap();
        let _scope = backend.new_stop_scope().unwrap();
        assert_eq!(backend.active_scope_count(), 1);
        backend.stop().await.unwrap();
    }

    #[tokio::test]
    async fn dispatch_scenario_three_greets_in_order() {
        let (_, backend) = memory_backend(BackendConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        backend.listen(
            "greet",
            handler_fn(move |kind, payload| {
                let hits = Arc::clone(&hits_clone);
                async move {
                    assert_eq!(kind, "greet");
                    assert_eq!(payload, json!("hi"));
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        for _ in 0..3 {
            backend.dispatch("greet", &json!("hi")).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn send_applies_mutator_chain_in_order() {
        struct Prefix(&'static str);
        impl ReplyMutator for Prefix {
            fn mutate(&self, _cx: &MutateContext<'_>, reply: String) -> String {
                format!("{}{reply}", self.0)
            }
        }

        let (transport, backend) = memory_backend(BackendConfig::default());
        backend.register_mutator(Arc::new(Prefix("[a]")));
        backend.register_mutator(Arc::new(Prefix("[b]")));

        backend.send("#chan", "hello").await.unwrap();

        assert_eq!(
            transport.sent(),
            vec![("#chan".to_string(), "[b][a]hello".to_string())]
        );
    }

    #[tokio::test]
    async fn mutator_sees_backend_identity_and_target() {
        struct Stamp(Arc<Mutex<Vec<(String, String)>>>);
        impl ReplyMutator for Stamp {
            fn mutate(&self, cx: &MutateContext<'_>, reply: String) -> String {
                self.0
                    .lock()
                    .unwrap()
                    .push((cx.backend_id.to_string(), cx.target.to_string()));
                reply
            }
        }

        let (_, backend) = memory_backend(BackendConfig {
            identifier: Some("bw-test".to_string()),
            ..BackendConfig::default()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        backend.register_mutator(Arc::new(Stamp(Arc::clone(&seen))));

        backend.send("#ops", "x").await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("bw-test".to_string(), "#ops".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_backend_queues_and_drains() {
        let (transport, backend) = memory_backend(BackendConfig {
            throttle: Some(ThrottleConfig {
                enabled: true,
                max_heat: 2,
                cooldown_rate: 1.0,
                queue_capacity: 16,
            }),
            ..BackendConfig::default()
        });

        backend.start().await.unwrap();
        backend.send("#c", "one").await.unwrap();
        backend.send("#c", "two").await.unwrap();
        backend.send("#c", "three").await.unwrap();

        assert_eq!(transport.sent_count(), 2);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let sent: Vec<String> = transport.sent().into_iter().map(|(_, t)| t).collect();
        assert_eq!(sent, vec!["one", "two", "three"]);

        backend.stop().await.unwrap();
    }

    #[tokio::test]
    async fn send_sync_saturated_fails_not_supported() {
        let (transport, backend) = memory_backend(BackendConfig {
            throttle: Some(ThrottleConfig {
                enabled: true,
                max_heat: 1,
                cooldown_rate: 1.0,
                queue_capacity: 16,
            }),
            ..BackendConfig::default()
        });

        backend.send_sync("#c", "first").unwrap();
        assert!(matches!(
            backend.send_sync("#c", "second"),
            Err(BackendError::NotSupported(_))
        ));
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn missing_capabilities_are_explicit() {
        let backend = Backend::new(Arc::new(NullTransport), BackendConfig::default()).unwrap();

        assert!(matches!(
            backend.send("#c", "x").await,
            Err(BackendError::NotSupported(_))
        ));
        assert!(matches!(
            backend.channel("#c"),
            Err(BackendError::NotSupported(_))
        ));
        assert!(matches!(
            backend.user("alice"),
            Err(BackendError::NotSupported(_))
        ));
        assert!(matches!(
            backend.construct_message_lines("#c", &["x".to_string()]),
            Err(BackendError::NotSupported(_))
        ));
        assert!(backend.composite_kinds().is_empty());
    }

    #[tokio::test]
    async fn directory_lookups_return_handles() {
        let (transport, backend) = memory_backend(BackendConfig::default());
        transport.add_channel(
            "#general",
            ChannelHandle {
                id: "#general".to_string(),
                name: Some("general".to_string()),
            },
        );

        let found = backend.channel("#general").unwrap();
        assert_eq!(found.unwrap().name.as_deref(), Some("general"));
        assert!(backend.channel("#missing").unwrap().is_none());
        assert!(backend.user("nobody").unwrap().is_none());
    }

    #[tokio::test]
    async fn compose_lines_builds_draft() {
        let (_, backend) = memory_backend(BackendConfig::default());
        let draft = backend
            .construct_message_lines("#c", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(draft.target, "#c");
        assert_eq!(draft.lines, vec!["a", "b"]);
        assert_eq!(backend.composite_kinds().len(), 1);
    }

    #[tokio::test]
    async fn registration_hooks_delegate_to_transport() {
        let (transport, backend) = memory_backend(BackendConfig::default());
        let bot = BotInfo::new("snobe");

        assert!(!backend.pre_bot_register(&bot));
        backend.post_bot_register(&bot);

        transport.set_veto_registration(true);
        assert!(backend.pre_bot_register(&bot));
    }

    #[tokio::test]
    async fn handler_failure_reaches_diagnostics() {
        let (_, backend) = memory_backend(BackendConfig::default());
        let mut diagnostics = backend.diagnostics();

        backend.listen(
            "oops",
            handler_fn(|_, _| async { Err(anyhow::anyhow!("bad handler")) }),
        );
        backend.dispatch("oops", &json!(null)).await;

        let failure = diagnostics.try_recv().unwrap();
        assert_eq!(failure.kind, "oops");
        assert!(failure.error.contains("bad handler"));
    }

    #[tokio::test]
    async fn deserialized_zero_cooldown_rate_rejected() {
        // A config like this used to reach the drain task and kill it
        // with a Duration conversion panic, stranding queued sends.
        let config: BackendConfig = serde_json::from_str(
            r#"{"throttle": {"cooldown_rate": 0.0, "max_heat": 1}}"#,
        )
        .unwrap();
        let result = Backend::new(Arc::new(MemoryTransport::new()), config);
        assert!(matches!(result, Err(BackendError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn negative_durations_rejected() {
        let config = BackendConfig {
            stop_grace_secs: -1.0,
            ..BackendConfig::default()
        };
        assert!(matches!(
            Backend::new(Arc::new(MemoryTransport::new()), config),
            Err(BackendError::InvalidConfig(_))
        ));

        let config = BackendConfig {
            handler_timeout_secs: Some(-0.5),
            ..BackendConfig::default()
        };
        assert!(matches!(
            Backend::new(Arc::new(MemoryTransport::new()), config),
            Err(BackendError::InvalidConfig(_))
        ));
    }
}
