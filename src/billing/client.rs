//! Retrying HTTP client for the billing API.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use super::error::BillingError;
use super::retry::Attempt;
use crate::config::{BackoffConfig, BillingConfig};

/// Options for a single logical request.
///
/// `retries` counts additional attempts: the request is sent at most
/// `retries + 1` times.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    /// Extra headers, applied over the client's authorization headers
    pub headers: HeaderMap,
    /// Per-attempt timeout; the client default when `None`
    pub timeout_ms: Option<u64>,
    pub retries: u32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
            timeout_ms: None,
            retries: 0,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn put(body: serde_json::Value) -> Self {
        Self {
            method: Method::PUT,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Client for the external billing API.
///
/// Every attempt is individually bounded by its timeout; there is no deadline
/// across attempts, so the worst case wall time of a call is
/// `(retries + 1) * timeout` plus the backoff between attempts.
#[derive(Debug, Clone)]
pub struct BillingClient {
    http: reqwest::Client,
    base_url: String,
    auth_headers: HeaderMap,
    timeout_ms: u64,
    backoff: BackoffConfig,
}

impl BillingClient {
    /// Create a client. Fails if no access token is configured.
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        let token = config
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(BillingError::MissingAccessToken)?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| BillingError::InvalidHeader("authorization".to_string()))?;
        bearer.set_sensitive(true);

        let mut auth_headers = HeaderMap::new();
        auth_headers.insert(AUTHORIZATION, bearer);
        auth_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(concat!("mercado/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BillingError::Transport)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_headers,
            timeout_ms: config.timeout_ms,
            backoff: config.backoff,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Send a request, retrying transient failures.
    ///
    /// Returns the first 2xx response. Statuses in
    /// [`RETRYABLE_STATUSES`](super::retry::RETRYABLE_STATUSES), timeouts and
    /// transport errors are retried with exponential backoff while attempts
    /// remain; any other status fails immediately.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Response, BillingError> {
        let url = self.url(endpoint);
        let timeout_ms = options.timeout_ms.unwrap_or(self.timeout_ms);
        let max_attempts = options.retries.saturating_add(1);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let is_last = attempt >= options.retries;
            let result = self.send_once(&url, &options, timeout_ms).await;

            let reason = match Attempt::classify(result) {
                Attempt::Success(response) => {
                    debug!(
                        method = %options.method,
                        endpoint = endpoint,
                        status = response.status().as_u16(),
                        attempts = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Billing API request succeeded"
                    );
                    return Ok(response);
                }
                Attempt::Terminal(response) => {
                    let err = status_error(response, timeout_ms).await;
                    return Err(self.fail(endpoint, &options.method, attempt, err));
                }
                Attempt::RetryableStatus(response) if is_last => {
                    let err = status_error(response, timeout_ms).await;
                    return Err(self.fail(endpoint, &options.method, attempt, err));
                }
                Attempt::RetryableError(err) if is_last => {
                    return Err(self.fail(endpoint, &options.method, attempt, err));
                }
                Attempt::RetryableStatus(response) => format!("status {}", response.status()),
                Attempt::RetryableError(err) => err.to_string(),
            };

            let delay = self.backoff.delay(attempt);
            warn!(
                method = %options.method,
                endpoint = endpoint,
                attempt = attempt + 1,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Billing API attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Send a request and decode the success body as JSON.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, BillingError> {
        let timeout_ms = options.timeout_ms.unwrap_or(self.timeout_ms);
        self.request(endpoint, options)
            .await?
            .json::<T>()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    BillingError::Timeout { timeout_ms }
                } else {
                    BillingError::Decode(err)
                }
            })
    }

    async fn send_once(
        &self,
        url: &str,
        options: &RequestOptions,
        timeout_ms: u64,
    ) -> Result<Response, BillingError> {
        let mut builder = self
            .http
            .request(options.method.clone(), url)
            .timeout(Duration::from_millis(timeout_ms))
            .headers(self.auth_headers.clone())
            .headers(options.headers.clone());

        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        // The request timeout also bounds the body read; this one bounds the headers.
        match tokio::time::timeout(Duration::from_millis(timeout_ms), builder.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(BillingError::Transport(err)),
            Err(_) => Err(BillingError::Timeout { timeout_ms }),
        }
    }

    fn fail(&self, endpoint: &str, method: &Method, attempt: u32, err: BillingError) -> BillingError {
        error!(
            method = %method,
            endpoint = endpoint,
            attempts = attempt + 1,
            status = err.status_code(),
            error = %err,
            "Billing API request failed"
        );
        err
    }
}

/// Read an error body within the attempt's time box.
async fn status_error(response: Response, timeout_ms: u64) -> BillingError {
    let status = response.status().as_u16();
    match tokio::time::timeout(Duration::from_millis(timeout_ms), response.text()).await {
        Ok(Ok(body)) => BillingError::status(status, body),
        Ok(Err(err)) if err.is_timeout() => BillingError::Timeout { timeout_ms },
        Ok(Err(err)) => BillingError::Transport(err),
        Err(_) => BillingError::Timeout { timeout_ms },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> BillingConfig {
        BillingConfig {
            base_url,
            access_token: Some("TEST-token".to_string()),
            timeout_ms: 2_000,
            backoff: BackoffConfig {
                base_delay_ms: 1,
                max_delay_ms: 5,
                max_jitter_ms: 0,
            },
        }
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    #[test]
    fn test_missing_token_rejected() {
        let mut config = test_config("http://localhost".to_string());
        config.access_token = None;
        assert!(matches!(BillingClient::new(&config), Err(BillingError::MissingAccessToken)));

        config.access_token = Some("   ".to_string());
        assert!(matches!(BillingClient::new(&config), Err(BillingError::MissingAccessToken)));
    }

    #[test]
    fn test_url_joining() {
        let client = BillingClient::new(&test_config("https://api.example.com/".to_string())).unwrap();
        assert_eq!(client.url("/v1/payments/1"), "https://api.example.com/v1/payments/1");
        assert_eq!(client.url("preapproval"), "https://api.example.com/preapproval");
    }

    #[tokio::test]
    async fn test_success_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/42"))
            .and(header("authorization", "Bearer TEST-token"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let body: serde_json::Value = client
            .request_json("/v1/payments/42", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(body["id"], 42);
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let response = client
            .request("/flaky", RequestOptions::get().with_retries(1))
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .request("/down", RequestOptions::get().with_retries(2))
            .await
            .unwrap_err();

        assert_eq!(request_count(&server).await, 3);
        assert_eq!(err.status_code(), Some(500));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_non_retryable_status_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .request("/missing", RequestOptions::get().with_retries(3))
            .await
            .unwrap_err();

        assert_eq!(request_count(&server).await, 1);
        assert_eq!(err.status_code(), Some(404));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_too_many_requests_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let response = client
            .request("/busy", RequestOptions::get().with_retries(2))
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let err = client.request("/gateway", RequestOptions::get()).await.unwrap_err();

        assert_eq!(request_count(&server).await, 1);
        assert_eq!(err.status_code(), Some(502));
    }

    #[tokio::test]
    async fn test_timeout_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let started = Instant::now();
        let err = client
            .request("/slow", RequestOptions::get().with_timeout_ms(50))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, BillingError::Timeout { timeout_ms: 50 }));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_timeout_applies_per_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let started = Instant::now();
        let err = client
            .request("/slow", RequestOptions::get().with_timeout_ms(50).with_retries(2))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_connection_failure_propagates_transport_error() {
        // Nothing listens on port 1
        let client = BillingClient::new(&test_config("http://127.0.0.1:1".to_string())).unwrap();
        let err = client
            .request("/anything", RequestOptions::get().with_retries(1))
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(err.status_code(), None);
    }

    #[tokio::test]
    async fn test_body_and_extra_headers_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/preapproval"))
            .and(header("x-idempotency-key", "abc-123"))
            .and(header("authorization", "Bearer TEST-token"))
            .and(body_json(json!({"reason": "Plan Pro"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "sub_1"})))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let options = RequestOptions::post(json!({"reason": "Plan Pro"})).with_header(
            HeaderName::from_static("x-idempotency-key"),
            HeaderValue::from_static("abc-123"),
        );
        let body: serde_json::Value = client.request_json("/preapproval", options).await.unwrap();

        assert_eq!(body["id"], "sub_1");
    }

    #[tokio::test]
    async fn test_undecodable_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = BillingClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .request_json::<serde_json::Value>("/x", RequestOptions::get())
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Decode(_)));
    }

    /// Serve `status` headers on every connection, then hold the body back.
    async fn stalled_body_server(status_line: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let head = format!("HTTP/1.1 {}\r\ncontent-length: 100\r\n\r\n", status_line);
                    let _ = stream.write_all(head.as_bytes()).await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_stalled_error_body_times_out() {
        let base_url = stalled_body_server("500 Internal Server Error").await;
        let client = BillingClient::new(&test_config(base_url)).unwrap();

        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.request("/x", RequestOptions::get().with_timeout_ms(50)),
        )
        .await;

        let err = result.expect("request outlived its time box").unwrap_err();
        assert!(matches!(err, BillingError::Timeout { timeout_ms: 50 }), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_stalled_terminal_body_times_out() {
        let base_url = stalled_body_server("404 Not Found").await;
        let client = BillingClient::new(&test_config(base_url)).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.request("/x", RequestOptions::get().with_timeout_ms(50).with_retries(2)),
        )
        .await;

        let err = result.expect("request outlived its time box").unwrap_err();
        assert!(matches!(err, BillingError::Timeout { .. }), "got {:?}", err);
    }
}
