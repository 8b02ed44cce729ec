//! Bounded retry execution with backoff and circuit-breaker gating.
//!
//! [`RetryManager::execute_with_retry`] is the only place that decides
//! retry-vs-stop. It never lets an error escape: callers always receive a
//! [`RetryResult`] describing what happened.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::time::{sleep, timeout};

use crate::error::FetchError;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;

/// How the inter-attempt delay grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Every delay equals `base_delay`.
    Fixed,
    /// `base_delay * multiplier^(attempt - 1)`.
    Exponential,
    /// `base_delay * attempt`.
    Linear,
}

/// Immutable retry policy, validated at construction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "crate::config::duration_secs")]
    pub base_delay: Duration,
    #[serde(with = "crate::config::duration_secs")]
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    pub jitter: bool,
    pub backoff_multiplier: f64,
    /// Deadline applied to each individual attempt.
    #[serde(with = "crate::config::opt_duration_secs")]
    pub timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            backoff_multiplier: 2.0,
            timeout: None,
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        strategy: BackoffStrategy,
    ) -> Result<Self, FetchError> {
        let config = Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_timeout(mut self, deadline: Duration) -> Self {
        self.timeout = Some(deadline);
        self
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        if self.max_attempts < 1 {
            return Err(FetchError::validation("max_attempts must be at least 1"));
        }
        if self.max_delay < self.base_delay {
            return Err(FetchError::validation("max_delay must be >= base_delay"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
            return Err(FetchError::validation(
                "backoff_multiplier must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Record of one failed attempt that was followed by a retry.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 1-indexed attempt number.
    pub attempt_number: u32,
    /// The backoff delay slept after this attempt.
    pub delay: Duration,
    pub error: FetchError,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one `execute_with_retry` call.
///
/// Only attempts that led to a retry are logged, so `attempts.len()` is
/// always at most `max_attempts - 1`; the terminal attempt surfaces through
/// `final_error` instead.
#[derive(Debug)]
pub struct RetryResult<T> {
    pub success: bool,
    pub result: Option<T>,
    pub attempts: Vec<RetryAttempt>,
    pub total_duration: Duration,
    pub final_error: Option<FetchError>,
}

impl<T> RetryResult<T> {
    /// Operation invocations made during this call. Zero when a circuit
    /// breaker rejected the call before the first attempt.
    pub fn invocations(&self) -> u32 {
        if !self.success
            && self.attempts.is_empty()
            && self
                .final_error
                .as_ref()
                .is_some_and(|e| e.kind == crate::error::FetchErrorKind::CircuitOpen)
        {
            return 0;
        }
        self.attempts.len() as u32 + 1
    }
}

/// Backoff delay before the retry that follows attempt `attempt` (1-indexed):
/// the strategy formula clamped to `max_delay`, with an optional uniform
/// jitter of ±10% of the clamped value, never below zero.
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config.base_delay.as_secs_f64();
    let raw = match config.strategy {
        BackoffStrategy::Fixed => base,
        BackoffStrategy::Exponential => {
            base * config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32)
        }
        BackoffStrategy::Linear => base * attempt as f64,
    };

    let mut secs = raw.min(config.max_delay.as_secs_f64());
    if config.jitter && secs > 0.0 {
        let jitter_amount = secs * 0.1;
        secs += rand::thread_rng().gen_range(-jitter_amount..=jitter_amount);
    }

    Duration::from_secs_f64(secs.max(0.0))
}

/// Executes operations under a retry policy, reporting outcomes to the
/// shared circuit-breaker registry.
#[derive(Clone, Debug)]
pub struct RetryManager {
    breakers: CircuitBreakerRegistry,
}

impl RetryManager {
    pub fn new(breakers: CircuitBreakerRegistry) -> Self {
        Self { breakers }
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Run `operation` with up to `config.max_attempts` attempts.
    ///
    /// When `circuit_breaker_key` is given, the breaker gates the whole call:
    /// a rejection returns immediately without invoking the operation, a
    /// success is recorded on the breaker, and exhaustion records a failure.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        config: &RetryConfig,
        circuit_breaker_key: Option<&str>,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let started = Instant::now();
        let mut attempts: Vec<RetryAttempt> = Vec::new();

        if let Some(key) = circuit_breaker_key {
            if !self.breakers.can_execute(key) {
                let remaining = self.breakers.time_until_probe(key);
                return RetryResult {
                    success: false,
                    result: None,
                    attempts,
                    total_duration: started.elapsed(),
                    final_error: Some(FetchError::circuit_open(key, remaining)),
                };
            }
        }

        let mut final_error: Option<FetchError> = None;

        for attempt in 1..=config.max_attempts {
            let outcome = match config.timeout {
                Some(deadline) => match timeout(deadline, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::timeout("fetch attempt", deadline)),
                },
                None => operation().await,
            };

            match outcome {
                Ok(value) => {
                    if let Some(key) = circuit_breaker_key {
                        self.breakers.record_success(key);
                    }
                    return RetryResult {
                        success: true,
                        result: Some(value),
                        attempts,
                        total_duration: started.elapsed(),
                        final_error: None,
                    };
                }
                Err(error) => {
                    let retryable = error.retry_decision().is_retryable();
                    if !retryable || attempt >= config.max_attempts {
                        if !retryable {
                            log::info!("not retrying {} error: {error}", error.kind);
                        }
                        final_error = Some(error);
                        break;
                    }

                    let delay = backoff_delay(attempt, config);
                    log::warn!(
                        "attempt {attempt}/{} failed: {error}. retrying in {:.2}s",
                        config.max_attempts,
                        delay.as_secs_f64()
                    );
                    attempts.push(RetryAttempt {
                        attempt_number: attempt,
                        delay,
                        error,
                        timestamp: Utc::now(),
                    });
                    sleep(delay).await;
                }
            }
        }

        if let Some(key) = circuit_breaker_key {
            self.breakers.record_failure(key);
        }

        RetryResult {
            success: false,
            result: None,
            attempts,
            total_duration: started.elapsed(),
            final_error,
        }
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(CircuitBreakerRegistry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::error::FetchErrorKind;
    use crate::resilience::circuit_breaker::{CircuitBreakerConfig, CircuitState};

    fn plain(strategy: BackoffStrategy, base: f64) -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs_f64(base),
            max_delay: Duration::from_secs(60),
            strategy,
            jitter: false,
            backoff_multiplier: 2.0,
            timeout: None,
        }
    }

    fn fast_retries(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            strategy: BackoffStrategy::Fixed,
            jitter: false,
            backoff_multiplier: 2.0,
            timeout: None,
        }
    }

    #[test]
    fn config_validation() {
        assert!(RetryConfig::new(
            0,
            Duration::from_secs(1),
            Duration::from_secs(2),
            BackoffStrategy::Fixed,
        )
        .is_err());
        assert!(RetryConfig::new(
            3,
            Duration::from_secs(2),
            Duration::from_secs(1),
            BackoffStrategy::Fixed,
        )
        .is_err());
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn exponential_delays_without_jitter() {
        let config = plain(BackoffStrategy::Exponential, 1.0);
        assert_eq!(backoff_delay(1, &config), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, &config), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, &config), Duration::from_secs(4));
    }

    #[test]
    fn fixed_and_linear_delays() {
        let fixed = plain(BackoffStrategy::Fixed, 0.5);
        assert_eq!(backoff_delay(4, &fixed), Duration::from_secs_f64(0.5));

        let linear = plain(BackoffStrategy::Linear, 0.5);
        assert_eq!(backoff_delay(1, &linear), Duration::from_secs_f64(0.5));
        assert_eq!(backoff_delay(3, &linear), Duration::from_secs_f64(1.5));
    }

    #[test]
    fn delay_is_clamped_to_max() {
        let mut config = plain(BackoffStrategy::Exponential, 1.0);
        config.max_delay = Duration::from_secs(3);
        assert_eq!(backoff_delay(10, &config), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let mut config = plain(BackoffStrategy::Fixed, 10.0);
        config.jitter = true;
        for _ in 0..100 {
            let delay = backoff_delay(1, &config).as_secs_f64();
            assert!((9.0..=11.0).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[tokio::test]
    async fn first_try_success_logs_no_attempts() {
        let manager = RetryManager::default();
        let result = manager
            .execute_with_retry(
                || async { Ok::<_, FetchError>("content") },
                &fast_retries(3),
                None,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.result, Some("content"));
        assert!(result.attempts.is_empty());
        assert_eq!(result.invocations(), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let manager = RetryManager::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = manager
            .execute_with_retry(
                move || {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                            Err(FetchError::network("connection reset"))
                        } else {
                            Ok("content")
                        }
                    }
                },
                &fast_retries(5),
                None,
            )
            .await;

        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].attempt_number, 1);
        assert_eq!(result.attempts[1].attempt_number, 2);
        assert_eq!(result.invocations(), 3);

        let slept: Duration = result.attempts.iter().map(|a| a.delay).sum();
        assert!(result.total_duration >= slept);
    }

    #[tokio::test]
    async fn exhaustion_keeps_only_pre_retry_attempts() {
        let manager = RetryManager::default();
        let result: RetryResult<()> = manager
            .execute_with_retry(
                || async { Err(FetchError::network("refused")) },
                &fast_retries(3),
                None,
            )
            .await;

        assert!(!result.success);
        // The terminal third attempt is not logged.
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.invocations(), 3);
        assert_eq!(
            result.final_error.as_ref().map(|e| e.kind),
            Some(FetchErrorKind::Network)
        );
    }

    #[tokio::test]
    async fn single_attempt_failure_logs_nothing() {
        let manager = RetryManager::default();
        let result: RetryResult<()> = manager
            .execute_with_retry(
                || async { Err(FetchError::network("refused")) },
                &fast_retries(1),
                None,
            )
            .await;

        assert!(!result.success);
        assert!(result.attempts.is_empty());
        assert!(result.final_error.is_some());
        assert_eq!(result.invocations(), 1);
    }

    #[tokio::test]
    async fn fatal_errors_stop_the_loop() {
        let manager = RetryManager::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: RetryResult<()> = manager
            .execute_with_retry(
                move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(FetchError::content("not parseable"))
                    }
                },
                &fast_retries(5),
                None,
            )
            .await;

        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.attempts.is_empty());
        assert_eq!(
            result.final_error.as_ref().map(|e| e.kind),
            Some(FetchErrorKind::Content)
        );
    }

    #[tokio::test]
    async fn per_attempt_timeout_is_retryable() {
        let manager = RetryManager::default();
        let mut config = fast_retries(2);
        config.timeout = Some(Duration::from_millis(10));

        let result: RetryResult<()> = manager
            .execute_with_retry(
                || async {
                    sleep(Duration::from_secs(5)).await;
                    Ok(())
                },
                &config,
                None,
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(
            result.final_error.as_ref().map(|e| e.kind),
            Some(FetchErrorKind::Timeout)
        );
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_without_invoking() {
        let breakers = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::new(1, 1, Duration::from_secs(60)).unwrap(),
        );
        breakers.record_failure("strategy:browser");
        let manager = RetryManager::new(breakers);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: RetryResult<()> = manager
            .execute_with_retry(
                move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                &fast_retries(3),
                Some("strategy:browser"),
            )
            .await;

        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(result.attempts.is_empty());
        assert_eq!(result.invocations(), 0);
        assert_eq!(
            result.final_error.as_ref().map(|e| e.kind),
            Some(FetchErrorKind::CircuitOpen)
        );
    }

    #[tokio::test]
    async fn outcomes_are_reported_to_the_breaker() {
        let breakers = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::new(2, 1, Duration::from_secs(60)).unwrap(),
        );
        let manager = RetryManager::new(breakers.clone());

        let failing: RetryResult<()> = manager
            .execute_with_retry(
                || async { Err(FetchError::network("refused")) },
                &fast_retries(2),
                Some("strategy:http"),
            )
            .await;
        assert!(!failing.success);
        // One breaker failure per exhausted call, not per attempt.
        assert_eq!(breakers.snapshot("strategy:http").unwrap().failure_count, 1);

        let ok = manager
            .execute_with_retry(
                || async { Ok::<_, FetchError>("content") },
                &fast_retries(2),
                Some("strategy:http"),
            )
            .await;
        assert!(ok.success);
        let snapshot = breakers.snapshot("strategy:http").unwrap();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }
}
