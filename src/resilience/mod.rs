//! Resilience building blocks
//!
//! Rate limiting, circuit breaking, and retry execution used by the fallback
//! orchestrator. Each piece is instance-owned and injectable; none of them
//! keep global state.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker,
    CircuitBreakerConfig,
    CircuitBreakerRegistry,
    CircuitBreakerSnapshot,
    CircuitState,
};
pub use rate_limiter::{domain_key, RateLimiter};
pub use retry::{
    backoff_delay,
    BackoffStrategy,
    RetryAttempt,
    RetryConfig,
    RetryManager,
    RetryResult,
};
