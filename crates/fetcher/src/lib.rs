pub mod page;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use courier_common::types::{DateKey, FetchOutcome};

pub use page::{ExtractError, find_dated_content};

/// Lookup of the content published for a date.
///
/// Implementations must be safe to call repeatedly: a lookup only reads.
/// Every failure is folded into [`FetchOutcome::Error`] so the controller can
/// treat it like "not yet published".
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, date_key: DateKey) -> FetchOutcome;

    /// Human-readable name for logs (e.g., "page").
    fn name(&self) -> &'static str;
}

/// Transport-level lookup failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timeout after {0:?} while reading {1}")]
    Timeout(Duration, String),

    #[error("HTTP error reading {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Reads the source page over HTTP and looks for the dated container.
pub struct PageFetcher {
    client: reqwest::Client,
    source_url: String,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(source_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let source_url = source_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Http {
                url: source_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            source_url,
            timeout,
        })
    }

    /// GET the source page, bounded by the fixed timeout.
    async fn read_page(&self) -> Result<String, FetchError> {
        let request = async {
            let response = self
                .client
                .get(&self.source_url)
                .send()
                .await
                .map_err(|e| self.classify(e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: self.source_url.clone(),
                    status,
                });
            }

            response.text().await.map_err(|e| self.classify(e))
        };

        // The client timeout covers each phase; this bounds the whole lookup.
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout, self.source_url.clone()))?
    }

    fn classify(&self, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout(self.timeout, self.source_url.clone())
        } else {
            FetchError::Http {
                url: self.source_url.clone(),
                source,
            }
        }
    }
}

#[async_trait]
impl ContentFetcher for PageFetcher {
    async fn fetch(&self, date_key: DateKey) -> FetchOutcome {
        let html = match self.read_page().await {
            Ok(html) => html,
            Err(e) => {
                tracing::debug!(date_key = %date_key, error = %e, "Source page unavailable");
                return FetchOutcome::Error(e.to_string());
            }
        };

        match find_dated_content(&html, date_key) {
            Ok(Some(content)) => FetchOutcome::Found(content),
            Ok(None) => FetchOutcome::NotFound,
            Err(e) => {
                tracing::debug!(date_key = %date_key, error = %e, "Dated container unreadable");
                FetchOutcome::Error(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "page"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_source_is_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let fetcher =
            PageFetcher::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap();
        let outcome = fetcher.fetch("2023-03-07".parse().unwrap()).await;
        assert!(matches!(outcome, FetchOutcome::Error(_)));
    }
}
