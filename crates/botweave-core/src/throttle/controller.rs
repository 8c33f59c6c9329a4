//! Heat counter, bounded outbound queue, and the drain task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use botweave_types::config::ThrottleConfig;
use botweave_types::error::BackendError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::backend::transport::{Outbound, Transport};
use crate::lifecycle::StopScope;

/// A send deferred because heat was at the ceiling.
#[derive(Debug, Clone)]
pub struct QueuedSend {
    pub target: String,
    pub text: String,
    pub queued_at: Instant,
}

struct ThrottleState {
    heat: u32,
    queue: VecDeque<QueuedSend>,
}

/// Bounds the rate of outbound sends for one backend instance.
///
/// Admission is non-blocking: a send either goes out immediately
/// (incrementing heat), lands on the bounded FIFO queue, or fails with
/// `Backpressure`. The [`run_drain`](Self::run_drain) task decays heat and
/// flushes the queue oldest-first while the backend is running.
pub struct ThrottleController {
    config: ThrottleConfig,
    inner: Mutex<ThrottleState>,
}

impl ThrottleController {
    /// Build a controller, rejecting configs whose rates cannot drive the
    /// drain interval.
    pub fn new(config: ThrottleConfig) -> Result<Self, BackendError> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(ThrottleState {
                heat: 0,
                queue: VecDeque::new(),
            }),
        })
    }

    /// The heat ceiling before sends start queueing.
    pub fn maximum_heat(&self) -> u32 {
        self.config.max_heat
    }

    /// Whether throttling is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Current heat. Always within `0..=maximum_heat()` while enabled.
    pub fn heat(&self) -> u32 {
        self.inner.lock().expect("throttle lock poisoned").heat
    }

    /// Number of queued sends awaiting budget.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().expect("throttle lock poisoned").queue.len()
    }

    /// Send `text` to `target`, throttled.
    ///
    /// Disabled throttling forwards immediately with no heat tracking.
    /// With headroom, the send goes out immediately and heat rises one
    /// unit. At the ceiling, the send is queued FIFO and this returns
    /// without blocking; a full queue fails with `Backpressure`.
    pub async fn send_throttled(
        &self,
        outbound: &dyn Outbound,
        target: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        if !self.config.enabled {
            return outbound
                .send_text(target, text)
                .await
                .map_err(BackendError::transport);
        }

        let admitted = {
            let mut state = self.inner.lock().expect("throttle lock poisoned");
            if state.heat < self.config.max_heat {
                state.heat += 1;
                true
            } else {
                if state.queue.len() >= self.config.queue_capacity {
                    return Err(BackendError::Backpressure {
                        capacity: self.config.queue_capacity,
                    });
                }
                state.queue.push_back(QueuedSend {
                    target: target.to_string(),
                    text: text.to_string(),
                    queued_at: Instant::now(),
                });
                debug!(target, queued = state.queue.len(), "send queued at heat ceiling");
                false
            }
        };

        if admitted {
            if let Err(error) = outbound.send_text(target, text).await {
                // The unit was never spent on a delivered message.
                let mut state = self.inner.lock().expect("throttle lock poisoned");
                state.heat = state.heat.saturating_sub(1);
                return Err(BackendError::transport(error));
            }
        }
        Ok(())
    }

    /// Non-suspending send.
    ///
    /// Fails with `NotSupported` whenever throttling is enabled and
    /// immediate admission is impossible -- a synchronous caller is never
    /// silently blocked or queued.
    pub fn send_sync(
        &self,
        outbound: &dyn Outbound,
        target: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        if self.config.enabled {
            let mut state = self.inner.lock().expect("throttle lock poisoned");
            if state.heat >= self.config.max_heat {
                return Err(BackendError::NotSupported(
                    "synchronous send while throttle is saturated".to_string(),
                ));
            }
            state.heat += 1;
        }
        let result = outbound.send_text_sync(target, text);
        if self.config.enabled && result.is_err() {
            let mut state = self.inner.lock().expect("throttle lock poisoned");
            state.heat = state.heat.saturating_sub(1);
        }
        result
    }

    /// Background decay-and-drain loop.
    ///
    /// Ticks at the cooldown rate; each tick decays one heat unit and then
    /// flushes queued sends oldest-first while there is headroom. Runs
    /// until the scope is cancelled (the owning backend stops).
    pub async fn run_drain(&self, transport: Arc<dyn Transport>, scope: StopScope) {
        let period = Duration::from_secs_f64(1.0 / self.config.cooldown_rate);
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = scope.cancelled() => {
                    debug!("throttle drain task cancelled");
                    break;
                }
                _ = tick.tick() => {
                    self.on_tick(transport.as_ref()).await;
                }
            }
        }
    }

    async fn on_tick(&self, transport: &dyn Transport) {
        let outbound = transport.outbound();

        // Decay and the first refill share one guard, so the budget a tick
        // frees goes to the oldest queued entry before any concurrent
        // admission can see it.
        let mut next = {
            let mut state = self.inner.lock().expect("throttle lock poisoned");
            state.heat = state.heat.saturating_sub(1);
            if outbound.is_some() {
                self.pop_with_budget(&mut state)
            } else {
                None
            }
        };

        let Some(outbound) = outbound else { return };

        // Send outside the lock.
        while let Some(entry) = next {
            if let Err(error) = outbound.send_text(&entry.target, &entry.text).await {
                warn!(target = %entry.target, %error, "queued send failed; re-queueing");
                let mut state = self.inner.lock().expect("throttle lock poisoned");
                state.heat = state.heat.saturating_sub(1);
                state.queue.push_front(entry);
                break;
            }
            debug!(
                waited_ms = entry.queued_at.elapsed().as_millis() as u64,
                "drained queued send"
            );
            next = {
                let mut state = self.inner.lock().expect("throttle lock poisoned");
                self.pop_with_budget(&mut state)
            };
        }
    }

    /// Pop the oldest queued entry if there is heat headroom, charging the
    /// unit to it immediately.
    fn pop_with_budget(&self, state: &mut ThrottleState) -> Option<QueuedSend> {
        if state.heat >= self.config.max_heat {
            return None;
        }
        let entry = state.queue.pop_front()?;
        state.heat += 1;
        Some(entry)
    }
}

impl std::fmt::Debug for ThrottleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock().expect("throttle lock poisoned");
        f.debug_struct("ThrottleController")
            .field("enabled", &self.config.enabled)
            .field("heat", &state.heat)
            .field("max_heat", &self.config.max_heat)
            .field("queued", &state.queue.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
