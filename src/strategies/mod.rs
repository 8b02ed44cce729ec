//! Fetch strategy seam.
//!
//! The orchestrator is strategy-agnostic: anything implementing
//! [`FetchStrategy`] can participate in the fallback chain. The crate ships a
//! plain HTTP strategy; browser-rendered strategies plug in through the same
//! trait.

pub mod http;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ::http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FetchError;

pub use self::http::HttpFetchStrategy;

/// Which strategy produced a result. `BrowserRendered` and `HttpFallback`
/// mark a success; `AllFailed` is the sole terminal failure tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    BrowserRendered,
    HttpFallback,
    AllFailed,
}

/// Page resource categories a rendering strategy may refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
    Media,
    Websocket,
    Script,
}

/// Everything a strategy needs for one fetch. Blocking hints are advisory:
/// strategies that cannot honor them ignore them.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub blocked_resources: Vec<ResourceKind>,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(30),
            blocked_resources: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_blocked_resources(mut self, blocked: Vec<ResourceKind>) -> Self {
        self.blocked_resources = blocked;
        self
    }
}

/// One way of fetching a document. Implementations must not panic on bad
/// input; every failure is a [`FetchError`] so the retry layer can classify
/// it.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Stable identifier used for circuit-breaker keys and metrics labels.
    fn name(&self) -> &'static str;

    /// Result tag reported when this strategy succeeds.
    fn kind(&self) -> FallbackStrategy;

    /// Fetch the document body.
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError>;
}

/// Convert caller-supplied string headers into a typed header map.
/// Invalid names or values are a validation error, never retried.
pub fn headers_from_map(headers: &HashMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetchError::validation(format!("invalid header name: {name}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| FetchError::validation(format!("invalid header value for: {name}")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
