//! Listener trait for dispatched backend events.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// A handler invoked for dispatched backend events.
///
/// Handlers receive the event kind and its payload. Returning an error
/// never aborts sibling handlers; the failure is captured and reported on
/// the dispatcher's diagnostics channel.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, kind: &str, payload: &Value) -> anyhow::Result<()>;
}

/// Wrap an async closure as a shareable [`EventHandler`].
///
/// The returned `Arc` is the handler's identity: registering the same
/// `Arc` twice is a no-op, while two calls to `handler_fn` with the same
/// closure produce two distinct handlers.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, kind: &str, payload: &Value) -> anyhow::Result<()> {
        (self.f)(kind.to_string(), payload.clone()).await
    }
}
