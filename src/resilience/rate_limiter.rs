//! Per-domain request spacing.
//!
//! Enforces a minimum interval between consecutive requests to the same
//! domain. Each domain gets its own gate, held from the spacing decision
//! through the wait and the timestamp update, so concurrent callers for one
//! domain serialize while unrelated domains proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use url::Url;

/// Derive the rate-limiting key for a URL: lowercased host with a leading
/// `www.` stripped. URLs without a host yield `None` and bypass limiting.
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let key = host.strip_prefix("www.").unwrap_or(&host);
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

#[derive(Debug, Default)]
struct DomainGate {
    last_access: Option<Instant>,
}

/// Enforces a minimum spacing between requests to the same domain.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    gates: Arc<Mutex<HashMap<String, Arc<Mutex<DomainGate>>>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn gate(&self, domain: &str) -> Arc<Mutex<DomainGate>> {
        let mut gates = self.gates.lock().await;
        gates.entry(domain.to_string()).or_default().clone()
    }

    /// Wait until a request to `domain` is permitted, then record the access.
    ///
    /// The domain's gate stays held across the wait: two concurrent calls for
    /// the same domain never complete within less than the configured
    /// interval of each other.
    pub async fn acquire(&self, domain: &str) {
        let gate = self.gate(domain).await;
        let mut gate = gate.lock().await;

        if let Some(last) = gate.last_access {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                log::warn!(
                    "rate limiting {domain}: sleeping for {:.2}s",
                    wait.as_secs_f64()
                );
                sleep(wait).await;
            }
        }

        gate.last_access = Some(Instant::now());
    }

    /// Remaining wait before the next request to `domain` is permitted.
    /// Zero when the domain is unknown or the interval already elapsed.
    pub async fn time_until_next(&self, domain: &str) -> Duration {
        let gate = self.gate(domain).await;
        let gate = gate.lock().await;
        match gate.last_access {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Forget the access record for one domain.
    pub async fn reset(&self, domain: &str) {
        let mut gates = self.gates.lock().await;
        gates.remove(domain);
    }

    /// Drop every tracked domain.
    pub async fn cleanup(&self) {
        let mut gates = self.gates.lock().await;
        gates.clear();
    }

    /// Number of domains currently tracked.
    pub async fn tracked_domains(&self) -> usize {
        let gates = self.gates.lock().await;
        gates.len()
    }
}
