//! Best-effort index commit.
//!
//! A development search index can be told to commit pending writes right away,
//! which makes freshly indexed documents searchable without waiting for the
//! index's own commit interval. The poller treats this as an optimization: if
//! it fails, polling simply takes longer.

use async_trait::async_trait;
use url::Url;

use crate::error::{Result, SearchPollError};
use crate::http::{HttpClient, HttpRequest};

/// Something that can force the search index to make recent writes visible.
#[async_trait]
pub trait CommitStrategy: Send + Sync {
    /// Issue one commit. Errors are reported, never retried.
    async fn commit(&self) -> Result<()>;

    /// Where commits go, for logging.
    fn target(&self) -> String;
}

/// Commits by posting `<commit/>` to the index's update handler.
#[derive(Clone)]
pub struct HttpCommit<H: HttpClient> {
    endpoint: Url,
    client: H,
    timeout_ms: u64,
}

impl<H: HttpClient> HttpCommit<H> {
    pub const UPDATE_PATH: &'static str = "/solr/update";
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    pub fn new(endpoint: Url, client: H) -> Self {
        Self {
            endpoint,
            client,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn request(&self) -> HttpRequest {
        HttpRequest {
            method: "POST".to_string(),
            endpoint: self.endpoint.to_string(),
            path: Self::UPDATE_PATH.to_string(),
            body: "<commit/>".to_string(),
            content_type: Some("text/xml".to_string()),
        }
    }
}

#[async_trait]
impl<H: HttpClient> CommitStrategy for HttpCommit<H> {
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn commit(&self) -> Result<()> {
        let request = self.request();
        let response = self
            .client
            .execute(&request, self.timeout_ms)
            .await
            .map_err(|e| SearchPollError::CommitOptimizationFailed(e.to_string()))?;

        if !response.is_success() {
            // First line only; index error pages carry full stack traces.
            let detail = response.body.lines().next().unwrap_or_default();
            return Err(SearchPollError::CommitOptimizationFailed(format!(
                "{} returned status {}: {}",
                request.url(),
                response.status,
                detail
            )));
        }

        tracing::debug!(status = response.status, "Index commit accepted");
        Ok(())
    }

    fn target(&self) -> String {
        self.endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockHttpClient};

    fn endpoint() -> Url {
        Url::parse("http://localhost:8983").unwrap()
    }

    #[tokio::test]
    async fn test_commit_posts_to_update_handler() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "POST /solr/update",
            Ok(HttpResponse {
                status: 200,
                body: String::new(),
            }),
        );

        let commit = HttpCommit::new(endpoint(), mock.clone()).with_timeout_ms(1500);
        commit.commit().await.unwrap();

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].endpoint, "http://localhost:8983/");
        assert_eq!(calls[0].body, "<commit/>");
        assert_eq!(calls[0].timeout_ms, 1500);
    }

    #[tokio::test]
    async fn test_non_success_status_is_commit_failure() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "POST /solr/update",
            Ok(HttpResponse {
                status: 500,
                body: "SolrException: no such core\n<stack trace>".to_string(),
            }),
        );

        let err = HttpCommit::new(endpoint(), mock).commit().await.unwrap_err();
        match err {
            SearchPollError::CommitOptimizationFailed(message) => {
                assert!(message.contains("500"));
                assert!(message.contains("no such core"));
                assert!(!message.contains("stack trace"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_commit_failure() {
        let mock = MockHttpClient::new();
        let err = HttpCommit::new(endpoint(), mock).commit().await.unwrap_err();
        assert!(matches!(err, SearchPollError::CommitOptimizationFailed(_)));
    }
}
