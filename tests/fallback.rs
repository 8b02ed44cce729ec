//! End-to-end tests for the fallback orchestrator against mock HTTP servers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fetchguard::{
    FallbackConfig, FallbackStrategy, FetchError, FetchOrchestrator, FetchRequest, FetchStrategy,
};

/// Stand-in for a browser-rendered strategy that always fails at the
/// transport level.
struct UnreachableBrowser;

#[async_trait]
impl FetchStrategy for UnreachableBrowser {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn kind(&self) -> FallbackStrategy {
        FallbackStrategy::BrowserRendered
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        Err(FetchError::network(format!(
            "could not connect to host: {}",
            request.url
        )))
    }
}

fn fast_config() -> FallbackConfig {
    FallbackConfig::default()
        .with_max_retries(2)
        .with_retry_base_delay(Duration::from_millis(1))
        .with_retry_max_delay(Duration::from_millis(5))
        .with_min_request_interval(Duration::from_millis(1))
        .with_http_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn fetches_through_the_http_strategy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>article</html>"))
        .mount(&server)
        .await;

    let orchestrator = FetchOrchestrator::with_config(fast_config()).unwrap();
    let url = format!("{}/article", server.uri());
    let result = orchestrator.fetch(&url).await;

    assert!(result.success, "fetch failed: {:?}", result.error);
    assert_eq!(result.strategy_used, FallbackStrategy::HttpFallback);
    assert_eq!(result.content.as_deref(), Some("<html>article</html>"));
    assert_eq!(result.attempts, 1);
    assert_eq!(result.final_url, url);
    assert!(result.performance_metrics.contains_key("http"));
    assert!(result.performance_metrics["total_time"] >= result.performance_metrics["http"]);
}

#[tokio::test]
async fn retries_recover_from_transient_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let config = fast_config().with_max_retries(3);
    let orchestrator = FetchOrchestrator::with_config(config).unwrap();
    let result = orchestrator.fetch(&format!("{}/flaky", server.uri())).await;

    assert!(result.success, "fetch failed: {:?}", result.error);
    assert_eq!(result.content.as_deref(), Some("recovered"));
    assert_eq!(result.attempts, 3);
}

#[tokio::test]
async fn falls_back_when_the_primary_strategy_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>doc</html>"))
        .mount(&server)
        .await;

    let orchestrator = FetchOrchestrator::builder()
        .with_config(fast_config())
        .with_strategy(Arc::new(UnreachableBrowser))
        .with_strategy(Arc::new(fetchguard::HttpFetchStrategy::new().unwrap()))
        .build()
        .unwrap();

    let result = orchestrator.fetch(&format!("{}/doc", server.uri())).await;
    assert!(result.success, "fetch failed: {:?}", result.error);
    assert_eq!(result.strategy_used, FallbackStrategy::HttpFallback);
    // Browser exhausted its two attempts before the single http attempt.
    assert_eq!(result.attempts, 3);
    assert!(result.performance_metrics.contains_key("browser"));
    assert!(result.performance_metrics.contains_key("http"));
}

#[tokio::test]
async fn persistent_failures_exhaust_every_strategy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let orchestrator = FetchOrchestrator::builder()
        .with_config(fast_config())
        .with_strategy(Arc::new(UnreachableBrowser))
        .with_strategy(Arc::new(fetchguard::HttpFetchStrategy::new().unwrap()))
        .build()
        .unwrap();

    let result = orchestrator.fetch(&format!("{}/gone", server.uri())).await;
    assert!(!result.success);
    assert_eq!(result.strategy_used, FallbackStrategy::AllFailed);
    assert_eq!(result.attempts, 4);
    // The error reflects the last strategy tried.
    assert!(result.error.as_deref().unwrap().contains("500"));
}

#[tokio::test]
async fn same_domain_fetches_are_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let config = fast_config().with_min_request_interval(Duration::from_millis(100));
    let orchestrator = FetchOrchestrator::with_config(config).unwrap();

    let started = std::time::Instant::now();
    orchestrator.fetch(&format!("{}/one", server.uri())).await;
    orchestrator.fetch(&format!("{}/two", server.uri())).await;
    assert!(started.elapsed() >= Duration::from_millis(90));
}

#[tokio::test]
async fn results_serialize_for_downstream_consumers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .mount(&server)
        .await;

    let orchestrator = FetchOrchestrator::with_config(fast_config()).unwrap();
    let result = orchestrator.fetch(&format!("{}/", server.uri())).await;

    let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["strategy_used"], "http_fallback");
    assert!(json["performance_metrics"]["total_time"].is_number());
}
