//! Scraping metrics collection.
//!
//! Aggregates fetch outcomes globally and per strategy for observability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregated counters across all fetches.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub started_at: DateTime<Utc>,
    pub total_fetches: u64,
    pub successes: u64,
    pub failures: u64,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_fetches: 0,
            successes: 0,
            failures: 0,
        }
    }
}

/// Per-strategy counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyStats {
    /// Fetch calls routed through the strategy (not individual retries).
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    /// Operation invocations including retries.
    pub invocations: u64,
    #[serde(with = "crate::config::opt_duration_secs")]
    pub average_latency: Option<Duration>,
}

impl StrategyStats {
    fn record(&mut self, success: bool, invocations: u32, latency: Duration) {
        self.calls += 1;
        self.invocations += invocations as u64;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }

        self.average_latency = Some(match self.average_latency {
            None => latency,
            Some(avg) => {
                let blended = (avg.as_secs_f64() * 0.9) + (latency.as_secs_f64() * 0.1);
                Duration::from_secs_f64(blended)
            }
        });
    }
}

/// Point-in-time view of collected metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub global: GlobalStats,
    pub strategies: HashMap<String, StrategyStats>,
}

#[derive(Debug, Default)]
struct MetricsState {
    global: GlobalStats,
    strategies: HashMap<String, StrategyStats>,
}

/// Thread-safe metrics collector owned by the orchestrator.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one strategy's run within a fetch call.
    pub fn record_strategy(
        &self,
        strategy: &str,
        success: bool,
        invocations: u32,
        latency: Duration,
    ) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard
            .strategies
            .entry(strategy.to_string())
            .or_default()
            .record(success, invocations, latency);
    }

    /// Record the final outcome of one fetch call.
    pub fn record_fetch(&self, success: bool) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard.global.total_fetches += 1;
        if success {
            guard.global.successes += 1;
        } else {
            guard.global.failures += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.inner.lock().expect("metrics lock poisoned");
        MetricsSnapshot {
            global: guard.global.clone(),
            strategies: guard.strategies.clone(),
        }
    }
}
