//! Fallback fetch orchestration.
//!
//! Wires together the rate limiter, circuit breakers, and retry manager
//! around an ordered list of fetch strategies. `fetch` is the sole entry
//! point the rest of a system depends on: it always returns a structured
//! [`ScrapingResult`], folding every failure into it instead of raising.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use url::Url;

use crate::config::FallbackConfig;
use crate::error::FetchError;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::resilience::circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerSnapshot,
};
use crate::resilience::rate_limiter::{domain_key, RateLimiter};
use crate::resilience::retry::{RetryConfig, RetryManager};
use crate::strategies::{
    headers_from_map, FallbackStrategy, FetchRequest, FetchStrategy, HttpFetchStrategy,
};

/// Outcome of one orchestrated fetch, handed to the content processor.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapingResult {
    pub success: bool,
    pub content: Option<String>,
    pub strategy_used: FallbackStrategy,
    /// Operation invocations across every strategy tried.
    pub attempts: u32,
    pub error: Option<String>,
    pub final_url: String,
    /// Timing keys in seconds: one entry per strategy tried, keyed by its
    /// name, plus the running `total_time`.
    pub performance_metrics: HashMap<String, f64>,
}

impl ScrapingResult {
    fn failure(
        url: &str,
        attempts: u32,
        error: String,
        performance_metrics: HashMap<String, f64>,
    ) -> Self {
        Self {
            success: false,
            content: None,
            strategy_used: FallbackStrategy::AllFailed,
            attempts,
            error: Some(error),
            final_url: url.to_string(),
            performance_metrics,
        }
    }
}

/// Fluent builder for [`FetchOrchestrator`].
#[derive(Default)]
pub struct FetchOrchestratorBuilder {
    config: FallbackConfig,
    strategies: Vec<Arc<dyn FetchStrategy>>,
}

impl FetchOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: FallbackConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a strategy; strategies run in the order they were added.
    pub fn with_strategy(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn build(self) -> Result<FetchOrchestrator, FetchError> {
        FetchOrchestrator::with_strategies(self.config, self.strategies)
    }
}

/// Orchestrates fetch strategies behind rate limiting, per-strategy circuit
/// breakers, and retry with backoff.
pub struct FetchOrchestrator {
    config: FallbackConfig,
    strategies: Vec<Arc<dyn FetchStrategy>>,
    rate_limiter: RateLimiter,
    breakers: CircuitBreakerRegistry,
    retry_manager: RetryManager,
    metrics: Option<MetricsCollector>,
}

impl FetchOrchestrator {
    /// Default orchestrator: plain HTTP strategy only, default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(FallbackConfig::default())
    }

    pub fn builder() -> FetchOrchestratorBuilder {
        FetchOrchestratorBuilder::new()
    }

    pub fn with_config(config: FallbackConfig) -> Result<Self, FetchError> {
        Self::with_strategies(config, Vec::new())
    }

    fn with_strategies(
        config: FallbackConfig,
        mut strategies: Vec<Arc<dyn FetchStrategy>>,
    ) -> Result<Self, FetchError> {
        config.validate()?;

        if strategies.is_empty() {
            strategies.push(Arc::new(HttpFetchStrategy::new()?) as Arc<dyn FetchStrategy>);
        }

        let breaker_config = CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_threshold,
            timeout: config.circuit_breaker_recovery,
            ..CircuitBreakerConfig::default()
        };
        breaker_config.validate()?;

        let breakers = CircuitBreakerRegistry::new(breaker_config);
        let retry_manager = RetryManager::new(breakers.clone());
        let rate_limiter = RateLimiter::new(config.min_request_interval);
        let metrics = config.enable_metrics.then(MetricsCollector::new);

        Ok(Self {
            config,
            strategies,
            rate_limiter,
            breakers,
            retry_manager,
            metrics,
        })
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// State of every circuit breaker created so far.
    pub fn circuit_breaker_status(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.snapshots()
    }

    /// Collected metrics, when enabled.
    pub fn metrics_snapshot(&self) -> Option<MetricsSnapshot> {
        self.metrics.as_ref().map(MetricsCollector::snapshot)
    }

    /// Fetch a document, trying each strategy in priority order.
    pub async fn fetch(&self, url: &str) -> ScrapingResult {
        self.fetch_with_headers(url, &HashMap::new()).await
    }

    /// Like [`fetch`](Self::fetch) with caller-supplied headers overlaid on
    /// each strategy's defaults.
    pub async fn fetch_with_headers(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> ScrapingResult {
        let started = Instant::now();
        let mut performance_metrics = HashMap::new();

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                performance_metrics.insert("total_time".to_string(), started.elapsed().as_secs_f64());
                return ScrapingResult::failure(url, 0, format!("invalid url: {e}"), performance_metrics);
            }
        };

        let header_map = match headers_from_map(headers) {
            Ok(map) => map,
            Err(e) => {
                performance_metrics.insert("total_time".to_string(), started.elapsed().as_secs_f64());
                return ScrapingResult::failure(url, 0, e.to_string(), performance_metrics);
            }
        };

        match domain_key(&parsed) {
            Some(domain) => self.rate_limiter.acquire(&domain).await,
            None => log::warn!("no valid domain for rate limiting: {url}"),
        }

        let blocked_resources = if self.config.enable_resource_blocking {
            self.config.blocked_resource_types.clone()
        } else {
            Vec::new()
        };

        let mut total_attempts = 0u32;
        let mut last_error: Option<FetchError> = None;

        for strategy in &self.strategies {
            let breaker_key = format!("strategy:{}", strategy.name());
            let retry_config = self.retry_config_for(strategy.as_ref());
            let request = FetchRequest::new(parsed.clone())
                .with_headers(header_map.clone())
                .with_timeout(
                    retry_config
                        .timeout
                        .unwrap_or(self.config.http_timeout),
                )
                .with_blocked_resources(blocked_resources.clone());

            let strategy_started = Instant::now();
            let shared = strategy.clone();
            let result = self
                .retry_manager
                .execute_with_retry(
                    move || {
                        let strategy = shared.clone();
                        let request = request.clone();
                        async move { strategy.fetch(&request).await }
                    },
                    &retry_config,
                    Some(&breaker_key),
                )
                .await;
            let elapsed = strategy_started.elapsed();

            total_attempts += result.invocations();
            performance_metrics.insert(strategy.name().to_string(), elapsed.as_secs_f64());
            performance_metrics.insert("total_time".to_string(), started.elapsed().as_secs_f64());

            if let Some(metrics) = &self.metrics {
                metrics.record_strategy(strategy.name(), result.success, result.invocations(), elapsed);
            }

            if result.success {
                if let Some(metrics) = &self.metrics {
                    metrics.record_fetch(true);
                }
                return ScrapingResult {
                    success: true,
                    content: result.result,
                    strategy_used: strategy.kind(),
                    attempts: total_attempts,
                    error: None,
                    final_url: url.to_string(),
                    performance_metrics,
                };
            }

            if let Some(error) = &result.final_error {
                log::warn!("strategy '{}' exhausted for {url}: {error}", strategy.name());
            }
            last_error = result.final_error;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_fetch(false);
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no fetch strategies configured".to_string());
        ScrapingResult::failure(url, total_attempts, message, performance_metrics)
    }

    fn retry_config_for(&self, strategy: &dyn FetchStrategy) -> RetryConfig {
        let timeout = match strategy.kind() {
            FallbackStrategy::BrowserRendered => self.config.browser_timeout,
            _ => self.config.http_timeout,
        };
        RetryConfig {
            max_attempts: self.config.max_retries,
            base_delay: self.config.retry_base_delay,
            max_delay: self.config.retry_max_delay,
            ..RetryConfig::default()
        }
        .with_timeout(timeout)
    }
}
