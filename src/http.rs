//! HTTP client abstraction for talking to the search index.
//!
//! This module defines the `HttpClient` trait so that the commit step can be
//! exercised against a mock in tests without a running index.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A request to be sent to the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method, e.g. "POST"
    pub method: String,
    /// Base URL: protocol, host and port
    pub endpoint: String,
    /// Path appended to the endpoint, starting with '/'
    pub path: String,
    /// Request body, sent only when non-empty
    pub body: String,
    /// Content type for the body
    pub content_type: Option<String>,
}

impl HttpRequest {
    /// Full URL of this request.
    pub fn url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), self.path)
    }
}

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for executing HTTP requests.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new();
/// let response = client.execute(&request, 5000).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute an HTTP request.
    ///
    /// # Errors
    /// Returns an error if the request fails due to network issues, times out,
    /// or the method is invalid. A non-2xx status is NOT an error here.
    async fn execute(&self, request: &HttpRequest, timeout_ms: u64) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already configured reqwest client (proxies, TLS roots...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn execute(&self, request: &HttpRequest, timeout_ms: u64) -> Result<HttpResponse> {
        let url = request.url();

        tracing::debug!(url = %url, timeout_ms, "Executing HTTP request");

        let method: reqwest::Method = request.method.parse().map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
            anyhow::anyhow!("Invalid HTTP method '{}': {}", request.method, e)
        })?;

        let mut req = self
            .client
            .request(method, &url)
            .timeout(Duration::from_millis(timeout_ms));

        if !request.body.is_empty() {
            if let Some(content_type) = &request.content_type {
                req = req.header("Content-Type", content_type.as_str());
            }
            req = req.body(request.body.clone());
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(status, response_len = body.len(), "HTTP request completed");

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Mock HTTP client for testing.
///
/// Responses are queued per "{method} {path}" key and returned in FIFO order.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response(
///     "POST /solr/update",
///     Ok(HttpResponse { status: 200, body: String::new() }),
/// );
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

struct MockResponse {
    response: Result<HttpResponse>,
    delay: Option<Duration>,
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: String,
    pub endpoint: String,
    pub path: String,
    pub body: String,
    pub timeout_ms: u64,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a method and path, e.g. "POST /solr/update".
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.push(key, MockResponse {
            response,
            delay: None,
        });
    }

    /// Queue a response that is only returned after `delay` has elapsed.
    pub fn add_delayed_response(&self, key: &str, response: Result<HttpResponse>, delay: Duration) {
        self.push(key, MockResponse {
            response,
            delay: Some(delay),
        });
    }

    fn push(&self, key: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &HttpRequest, timeout_ms: u64) -> Result<HttpResponse> {
        self.calls.lock().push(MockCall {
            method: request.method.clone(),
            endpoint: request.endpoint.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
            timeout_ms,
        });

        let key = format!("{} {}", request.method, request.path);
        let queued = {
            let mut responses = self.responses.lock();
            match responses.get_mut(&key) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match queued {
            Some(MockResponse { response, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                response
            }
            None => Err(crate::error::SearchPollError::Other(anyhow::anyhow!(
                "No mock response configured for {} {}",
                request.method,
                request.path
            ))),
        }
    }
}
