//! # fetchguard
//!
//! Resilient document fetching for hostile networks: timeouts, transient
//! failures, and anti-bot blocks are absorbed by an ordered chain of fetch
//! strategies, each wrapped in retry with backoff and a circuit breaker,
//! behind a per-domain rate limiter.
//!
//! The orchestrator never raises out of a fetch: every outcome is a
//! structured [`ScrapingResult`] the rest of a system can consume directly.
//!
//! ## Example
//!
//! ```no_run
//! use fetchguard::FetchOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = FetchOrchestrator::new()?;
//!     let result = orchestrator.fetch("https://example.com").await;
//!     if result.success {
//!         println!("{}", result.content.unwrap_or_default());
//!     } else {
//!         eprintln!("fetch failed: {:?}", result.error);
//!     }
//!     Ok(())
//! }
//! ```

mod orchestrator;

pub mod config;
pub mod error;
pub mod metrics;
pub mod resilience;
pub mod strategies;

pub use crate::orchestrator::{
    FetchOrchestrator,
    FetchOrchestratorBuilder,
    ScrapingResult,
};

pub use crate::config::FallbackConfig;

pub use crate::error::{
    FetchError,
    FetchErrorKind,
    RetryDecision,
};

pub use crate::metrics::{
    GlobalStats,
    MetricsCollector,
    MetricsSnapshot,
    StrategyStats,
};

pub use crate::resilience::{
    backoff_delay,
    domain_key,
    BackoffStrategy,
    CircuitBreaker,
    CircuitBreakerConfig,
    CircuitBreakerRegistry,
    CircuitBreakerSnapshot,
    CircuitState,
    RateLimiter,
    RetryAttempt,
    RetryConfig,
    RetryManager,
    RetryResult,
};

pub use crate::strategies::{
    headers_from_map,
    FallbackStrategy,
    FetchRequest,
    FetchStrategy,
    HttpFetchStrategy,
    ResourceKind,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
