//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::strategies::ResourceKind;

/// Serde helpers for durations expressed in (fractional) seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be non-negative"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Serde helpers for optional durations expressed in (fractional) seconds.
pub mod opt_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        match secs {
            Some(secs) if secs.is_finite() && secs >= 0.0 => {
                Ok(Some(Duration::from_secs_f64(secs)))
            }
            Some(_) => Err(serde::de::Error::custom("duration must be non-negative")),
            None => Ok(None),
        }
    }
}

/// Configuration for the fallback orchestrator. Immutable once the
/// orchestrator is built; validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Per-attempt deadline for browser-rendered strategies.
    #[serde(with = "duration_secs")]
    pub browser_timeout: Duration,
    /// Per-attempt deadline for the plain HTTP strategy.
    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,
    /// Attempts each strategy gets before the orchestrator falls through.
    pub max_retries: u32,
    /// First inter-attempt backoff delay.
    #[serde(with = "duration_secs")]
    pub retry_base_delay: Duration,
    /// Ceiling for inter-attempt backoff delays.
    #[serde(with = "duration_secs")]
    pub retry_max_delay: Duration,
    /// Consecutive failures that open a strategy's circuit breaker.
    pub circuit_breaker_threshold: u32,
    /// Cooldown before an open breaker allows a probe.
    #[serde(with = "duration_secs")]
    pub circuit_breaker_recovery: Duration,
    /// Minimum spacing between requests to the same domain.
    #[serde(with = "duration_secs")]
    pub min_request_interval: Duration,
    /// Whether strategies that can block page resources should do so.
    pub enable_resource_blocking: bool,
    /// Resource types handed to capable strategies as blocking hints.
    pub blocked_resource_types: Vec<ResourceKind>,
    /// Whether the orchestrator records metrics.
    pub enable_metrics: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            browser_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(60),
            circuit_breaker_threshold: 5,
            circuit_breaker_recovery: Duration::from_secs(30),
            min_request_interval: Duration::from_secs(2),
            enable_resource_blocking: true,
            blocked_resource_types: vec![
                ResourceKind::Image,
                ResourceKind::Stylesheet,
                ResourceKind::Font,
                ResourceKind::Media,
                ResourceKind::Websocket,
            ],
            enable_metrics: true,
        }
    }
}

impl FallbackConfig {
    pub fn with_browser_timeout(mut self, timeout: Duration) -> Self {
        self.browser_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = delay;
        self
    }

    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    pub fn with_circuit_breaker_recovery(mut self, recovery: Duration) -> Self {
        self.circuit_breaker_recovery = recovery;
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn without_resource_blocking(mut self) -> Self {
        self.enable_resource_blocking = false;
        self
    }

    pub fn without_metrics(mut self) -> Self {
        self.enable_metrics = false;
        self
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        if self.max_retries < 1 {
            return Err(FetchError::validation("max_retries must be at least 1"));
        }
        if self.circuit_breaker_threshold < 1 {
            return Err(FetchError::validation(
                "circuit_breaker_threshold must be at least 1",
            ));
        }
        if self.circuit_breaker_recovery.is_zero() {
            return Err(FetchError::validation(
                "circuit_breaker_recovery must be positive",
            ));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(FetchError::validation(
                "retry_max_delay must be >= retry_base_delay",
            ));
        }
        Ok(())
    }
}
