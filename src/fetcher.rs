//! Feed download over HTTP.
//!
//! The pipeline talks to the network through the [`FetchFeed`] trait so it can
//! be driven by a stub in tests. [`HttpFetcher`] is the `reqwest` backed
//! implementation used by the binary.
//!
//! There is no retry here. The caller falls back to the on-disk cache once
//! when a fetch fails.

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors that can occur while obtaining a feed body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connection, TLS, timeout, body read).
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response with a non-2xx status code.
    #[error("Status code: {0}")]
    HttpStatus(u16),
    /// Response body is not valid JSON.
    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),
}

/// Something that can turn a feed URL into its raw body.
pub trait FetchFeed {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// `reqwest` backed fetcher with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl FetchFeed for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Feed request returned non-success status");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        let body = response.text().await?;
        debug!(
            %url,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Downloaded feed"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"{"exportedMediaSourceDataList":{"mediaSources":[]}}"#;

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/feed.json", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body, BODY);
    }

    #[tokio::test]
    async fn test_fetch_404_is_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/missing.json", mock_server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BODY)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_millis(50)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/slow.json", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }
}
