//! End-to-end calls against a local HTTP server.
#![cfg(feature = "reqwest")]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use heimdall::{
    Gatekeeper, Heimdall, HeimdallError, NetworkErrorKind, Request, RetryConfig, UpstreamError,
};

#[derive(Clone)]
struct HttpGet {
    client: reqwest::Client,
    url: String,
}

impl HttpGet {
    fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Request for HttpGet {
    type Output = String;

    async fn execute(&self) -> Result<String, UpstreamError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), retry_after, body));
        }
        Ok(response.text().await?)
    }
}

fn gatekeeper() -> Gatekeeper<String> {
    Heimdall::builder()
        .environment("development")
        .retry(
            RetryConfig::new()
                .max_attempts(3)
                .base_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(50))
                .jitter(false),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn rate_limited_response_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let gk = gatekeeper();
    let url = format!("{}/api/users", server.uri());
    let body = gk.call(url.as_str(), HttpGet::new(&url)).await.unwrap();

    assert_eq!(body, "[]");
    let stats = gk.get_statistics();
    assert_eq!(stats.real_call_count, 2);
    assert_eq!(stats.throttled_count, 1);
    assert_eq!(stats.retries, 1);
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(3)
        .mount(&server)
        .await;

    let gk = gatekeeper();
    let url = format!("{}/api/flaky", server.uri());
    let err = gk.call(url.as_str(), HttpGet::new(&url)).await.unwrap_err();

    assert_eq!(err.attempts(), Some(3));
    assert_eq!(
        err.upstream(),
        Some(&UpstreamError::Status {
            status: 503,
            message: "down".into(),
        })
    );
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/secret"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let gk = gatekeeper();
    let url = format!("{}/api/secret", server.uri());
    let err = gk.call(url.as_str(), HttpGet::new(&url)).await.unwrap_err();
    assert!(matches!(err, HeimdallError::NonRetryable { attempts: 1, .. }));
}

#[tokio::test]
async fn concurrent_identical_requests_reach_the_server_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/report"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("report")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gk = gatekeeper();
    let url = format!("{}/api/report", server.uri());
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let gk = gk.clone();
            let url = url.clone();
            tokio::spawn(async move { gk.call(url.as_str(), HttpGet::new(&url)).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "report");
    }
    assert_eq!(gk.get_statistics().dedup_joins, 4);

    // Settled and cached: no further traffic.
    assert_eq!(gk.call(url.as_str(), HttpGet::new(&url)).await.unwrap(), "report");
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/api/users");

    let gk = gatekeeper();
    let err = gk.call(url.as_str(), HttpGet::new(&url)).await.unwrap_err();

    assert_eq!(err.attempts(), Some(3));
    assert!(matches!(
        err.upstream(),
        Some(UpstreamError::Network {
            kind: NetworkErrorKind::Connect,
            ..
        })
    ));
}
