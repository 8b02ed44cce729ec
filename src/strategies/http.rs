//! Plain HTTP fetch strategy.
//!
//! The lightweight end of the fallback chain: a reqwest client with
//! browser-like default headers. Resource-blocking hints do not apply to a
//! non-rendering fetch and are ignored.

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use once_cell::sync::Lazy;

use crate::error::FetchError;
use crate::strategies::{FallbackStrategy, FetchRequest, FetchStrategy};

static DEFAULT_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static("Mozilla/5.0 (compatible; fetchguard/0.1)"),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
});

/// Fetches documents with a plain HTTP GET, no rendering.
pub struct HttpFetchStrategy {
    client: reqwest::Client,
}

impl HttpFetchStrategy {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(DEFAULT_HEADERS.clone())
            .build()
            .map_err(|e| FetchError::validation(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (shared connection pool, custom TLS setup…).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchStrategy for HttpFetchStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    fn kind(&self) -> FallbackStrategy {
        FallbackStrategy::HttpFallback
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let response = self
            .client
            .get(request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, request))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::network(format!(
                "http status {} for {}",
                status.as_u16(),
                request.url
            ))
            .with_context("status", status.as_u16().to_string()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::content(format!("failed to decode response body: {e}")))
    }
}

fn classify_reqwest_error(error: reqwest::Error, request: &FetchRequest) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout("http fetch", request.timeout)
    } else if error.is_connect() || error.is_request() {
        FetchError::network(format!("request to {} failed: {error}", request.url))
    } else {
        FetchError::other(format!("http error for {}: {error}", request.url))
    }
}
