//! Circuit breaker state machine and per-key registry.
//!
//! A breaker cycles CLOSED → OPEN → HALF_OPEN → CLOSED|OPEN for the life of
//! the process. Breakers are created lazily per key and each one sits behind
//! its own mutex, so state transitions are atomic under concurrent callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::FetchError;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Rejecting calls until the recovery timeout elapses.
    Open,
    /// Letting probe calls through to test recovery.
    HalfOpen,
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker again.
    pub success_threshold: u32,
    /// Cooldown before an open breaker allows a probe.
    #[serde(with = "crate::config::duration_secs")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let config = Self {
            failure_threshold,
            success_threshold,
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        if self.failure_threshold < 1 {
            return Err(FetchError::validation("failure_threshold must be at least 1"));
        }
        if self.success_threshold < 1 {
            return Err(FetchError::validation("success_threshold must be at least 1"));
        }
        Ok(())
    }
}

/// Observable state of one breaker, for introspection endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
}

/// Single-key circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether a call may proceed. An open breaker whose cooldown has elapsed
    /// transitions to half-open here and lets the probe through.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure_time
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                    self.success_count = 0;
                    log::info!("circuit breaker '{}' moved to HALF_OPEN", self.key);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Remaining cooldown while open; `None` once a probe would be allowed.
    pub fn time_until_probe(&self) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let at = self.last_failure_time?;
        let remaining = self.config.timeout.saturating_sub(at.elapsed());
        (remaining > Duration::ZERO).then_some(remaining)
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    log::info!("circuit breaker '{}' moved to CLOSED", self.key);
                }
            }
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                    log::warn!("circuit breaker '{}' moved to OPEN", self.key);
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                log::warn!("circuit breaker '{}' re-opened from HALF_OPEN", self.key);
            }
            CircuitState::Open => {}
        }
    }

    fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            key: self.key.clone(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
        }
    }
}

/// Lazily-populated registry of per-key breakers. Cloning shares the
/// underlying map, so an orchestrator and its retry manager see one set of
/// breakers without any global state.
#[derive(Clone, Debug)]
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    inner: Arc<RwLock<HashMap<String, Arc<Mutex<CircuitBreaker>>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch the breaker for `key`, creating it with the registry default
    /// config on first use.
    pub fn breaker(&self, key: &str) -> Arc<Mutex<CircuitBreaker>> {
        {
            let map = self.inner.read().expect("breaker registry lock poisoned");
            if let Some(existing) = map.get(key) {
                return existing.clone();
            }
        }
        let mut map = self.inner.write().expect("breaker registry lock poisoned");
        map.entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CircuitBreaker::new(key, self.default_config)))
            })
            .clone()
    }

    pub fn can_execute(&self, key: &str) -> bool {
        let breaker = self.breaker(key);
        let mut breaker = breaker.lock().expect("circuit breaker lock poisoned");
        breaker.can_execute()
    }

    pub fn record_success(&self, key: &str) {
        let breaker = self.breaker(key);
        let mut breaker = breaker.lock().expect("circuit breaker lock poisoned");
        breaker.record_success();
    }

    pub fn record_failure(&self, key: &str) {
        let breaker = self.breaker(key);
        let mut breaker = breaker.lock().expect("circuit breaker lock poisoned");
        breaker.record_failure();
    }

    /// Remaining cooldown for `key`, if it is currently open.
    pub fn time_until_probe(&self, key: &str) -> Option<Duration> {
        let breaker = self.breaker(key);
        let breaker = breaker.lock().expect("circuit breaker lock poisoned");
        breaker.time_until_probe()
    }

    /// Snapshot of one breaker; `None` when the key was never used.
    pub fn snapshot(&self, key: &str) -> Option<CircuitBreakerSnapshot> {
        let map = self.inner.read().expect("breaker registry lock poisoned");
        map.get(key).map(|breaker| {
            breaker
                .lock()
                .expect("circuit breaker lock poisoned")
                .snapshot()
        })
    }

    /// Snapshots of every breaker created so far.
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let map = self.inner.read().expect("breaker registry lock poisoned");
        map.values()
            .map(|breaker| {
                breaker
                    .lock()
                    .expect("circuit breaker lock poisoned")
                    .snapshot()
            })
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
