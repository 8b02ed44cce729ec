//! Structured error values for the fetch orchestration core.
//!
//! Every failure travelling through the retry and fallback layers is a
//! [`FetchError`]: an error kind, a human-readable message, and optional
//! context, so callers can branch on the kind instead of matching on text.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Category of a fetch failure. Determines retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Transport-level failure: connection refused, DNS resolution, reset.
    Network,
    /// An attempt exceeded its deadline.
    Timeout,
    /// The transport succeeded but the content is unusable.
    Content,
    /// Bad input or misconfiguration.
    Validation,
    /// A circuit breaker refused the call before it was attempted.
    CircuitOpen,
    /// Anything else. Assumed transient.
    Other,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Content => "content",
            FetchErrorKind::Validation => "validation",
            FetchErrorKind::CircuitOpen => "circuit_open",
            FetchErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Structured failure produced by strategies and the resilience layers.
#[derive(Debug, Clone, Error)]
#[error("[{kind}] {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// Free-form key/value context (domain, status code, operation…).
    pub context: HashMap<String, String>,
    /// Suggested wait before the next attempt, when the failure implies one.
    pub retry_after: Option<Duration>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: HashMap::new(),
            retry_after: None,
        }
    }

    /// Network-level failure with the default 5s retry hint.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message).with_retry_after(Duration::from_secs(5))
    }

    /// Deadline exceeded; the retry hint scales from the deadline itself.
    pub fn timeout(operation: &str, deadline: Duration) -> Self {
        Self::new(
            FetchErrorKind::Timeout,
            format!(
                "operation '{operation}' timed out after {:.1}s",
                deadline.as_secs_f64()
            ),
        )
        .with_context("operation", operation)
        .with_retry_after(deadline.mul_f64(1.5))
    }

    pub fn content(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Content, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Validation, message)
    }

    /// Refusal emitted when a circuit breaker rejects the call outright.
    pub fn circuit_open(key: &str, remaining: Option<Duration>) -> Self {
        let mut error = Self::new(
            FetchErrorKind::CircuitOpen,
            format!("circuit breaker '{key}' is open"),
        )
        .with_context("circuit_breaker_key", key);
        error.retry_after = remaining;
        error
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Other, message)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    /// Retry policy for this failure. The single place that decides
    /// retry-vs-stop; the retry manager consults nothing else.
    pub fn retry_decision(&self) -> RetryDecision {
        match self.kind {
            FetchErrorKind::Network | FetchErrorKind::Timeout => {
                RetryDecision::Retryable(self.retry_after)
            }
            // Retrying cannot fix malformed content or a bad request.
            FetchErrorKind::Content | FetchErrorKind::Validation => RetryDecision::Fatal,
            // The breaker already decided; retrying inside the same call
            // would defeat the cooldown.
            FetchErrorKind::CircuitOpen => RetryDecision::Fatal,
            // Most unknown failures are transient.
            FetchErrorKind::Other => RetryDecision::Retryable(self.retry_after),
        }
    }
}

/// Outcome of classifying a failure for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Worth another attempt, optionally with a suggested wait.
    Retryable(Option<Duration>),
    /// Further attempts cannot change the outcome.
    Fatal,
}

impl RetryDecision {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryDecision::Retryable(_))
    }
}
