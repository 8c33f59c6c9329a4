//! Configuration types for backend construction.
//!
//! All fields have sensible defaults; the throttle constants match what
//! IRC-style transports have historically needed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Outbound throttling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Whether throttling is enabled. When false, sends bypass the queue
    /// entirely and heat is not tracked.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Heat ceiling: the number of sends admitted before further sends
    /// are queued.
    #[serde(default = "default_max_heat")]
    pub max_heat: u32,

    /// Heat units decayed per second.
    #[serde(default = "default_cooldown_rate")]
    pub cooldown_rate: f64,

    /// Bounded capacity of the outbound queue. Enqueue attempts beyond
    /// this fail with `Backpressure`.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_max_heat() -> u32 {
    5
}

fn default_cooldown_rate() -> f64 {
    1.2
}

fn default_queue_capacity() -> usize {
    128
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_heat: default_max_heat(),
            cooldown_rate: default_cooldown_rate(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ThrottleConfig {
    /// Check that the configured rate yields a usable cooldown period.
    ///
    /// The serde layer accepts any float; a zero, negative, or non-finite
    /// rate would make the drain interval unconstructible, so it is
    /// rejected here before any task is spawned with it.
    pub fn validate(&self) -> Result<(), BackendError> {
        if !self.cooldown_rate.is_finite() || self.cooldown_rate <= 0.0 {
            return Err(BackendError::InvalidConfig(format!(
                "cooldown_rate must be positive and finite, got {}",
                self.cooldown_rate
            )));
        }
        match Duration::try_from_secs_f64(1.0 / self.cooldown_rate) {
            Ok(period) if !period.is_zero() => Ok(()),
            _ => Err(BackendError::InvalidConfig(format!(
                "cooldown_rate {} does not yield a representable period",
                self.cooldown_rate
            ))),
        }
    }
}

/// Configuration for a backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend identifier; generated (UUIDv7) when not supplied.
    #[serde(default)]
    pub identifier: Option<String>,

    /// Throttling configuration. `None` builds a backend without a
    /// throttle controller at all.
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,

    /// Optional per-handler dispatch timeout, in seconds. No timeout is
    /// imposed by default.
    #[serde(default)]
    pub handler_timeout_secs: Option<f64>,

    /// How long `stop()` waits for active scopes to acknowledge
    /// cancellation before forcing teardown.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: f64,
}

fn default_stop_grace_secs() -> f64 {
    5.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            throttle: None,
            handler_timeout_secs: None,
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

impl BackendConfig {
    /// A config with throttling enabled at the default rates.
    pub fn throttled() -> Self {
        Self {
            throttle: Some(ThrottleConfig::default()),
            ..Self::default()
        }
    }

    /// Check every duration field is representable and the throttle
    /// section (when present) is usable.
    pub fn validate(&self) -> Result<(), BackendError> {
        if let Some(throttle) = &self.throttle {
            throttle.validate()?;
        }
        if let Some(secs) = self.handler_timeout_secs {
            validate_secs("handler_timeout_secs", secs)?;
        }
        validate_secs("stop_grace_secs", self.stop_grace_secs)
    }
}

fn validate_secs(name: &str, secs: f64) -> Result<(), BackendError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(_) => Ok(()),
        Err(_) => Err(BackendError::InvalidConfig(format!(
            "{name} must be a non-negative finite duration, got {secs}"
        ))),
    }
}
