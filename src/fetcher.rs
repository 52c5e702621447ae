//! Fetches single SERP pages through the third-party proxy service.

use crate::config::Config;
use crate::error::{AppError, FetchError, Result};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use url::Url;

/// One outbound page fetch. Implementations classify failures but never
/// retry; the orchestrator owns the retry policy.
pub(crate) trait PageFetcher {
    /// Fetches the result page at the given 0-based page index (the engine
    /// paginates in units of `results_per_page`). Returns the raw HTML body.
    async fn fetch_page(&self, query: &str, page: u32) -> std::result::Result<String, FetchError>;
}

/// Fetches pages by forwarding search URLs to the SERP proxy with a bearer
/// credential, requesting the raw HTML response body.
#[derive(Debug, Clone)]
pub(crate) struct ProxyFetcher {
    client: Client,
    config: Arc<Config>,
    token: String,
}

impl ProxyFetcher {
    pub(crate) fn new(config: Arc<Config>) -> Result<Self> {
        let token = config
            .proxy_token
            .clone()
            .ok_or_else(|| AppError::Config("Proxy token is not configured".to_string()))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            token,
        })
    }

    /// Builds the upstream search URL the proxy should retrieve.
    fn search_url(&self, query: &str, page: u32) -> std::result::Result<Url, FetchError> {
        let base = format!("https://www.{}/search", self.config.search_engine_domain);
        let offset = page * self.config.results_per_page;
        Url::parse_with_params(
            &base,
            &[
                ("q", query),
                ("num", &self.config.results_per_page.to_string()),
                ("start", &offset.to_string()),
            ],
        )
        .map_err(|e| FetchError::Unknown(format!("failed to build search URL: {}", e)))
    }
}

impl PageFetcher for ProxyFetcher {
    async fn fetch_page(&self, query: &str, page: u32) -> std::result::Result<String, FetchError> {
        let target = self.search_url(query, page)?;
        tracing::debug!(target: "fetch_task", "Requesting page {} for query: {}", page, query);

        let response = self
            .client
            .post(&self.config.proxy_endpoint)
            .bearer_auth(&self.token)
            .json(&json!({
                "zone": self.config.proxy_zone,
                "url": target.as_str(),
                "format": "raw",
            }))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "fetch_task", "Proxy rejected page {} with status {}", page, status);
            return Err(FetchError::RemoteRejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unknown(format!("failed to read response body: {}", e)))?;

        tracing::debug!(target: "fetch_task", "Received {} bytes for page {}", body.len(), page);
        Ok(body)
    }
}

fn classify_request_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::NoResponse(e.to_string())
    } else {
        FetchError::Unknown(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> ProxyFetcher {
        let config = Config {
            proxy_token: Some("token".to_string()),
            ..Config::default()
        };
        ProxyFetcher::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn test_search_url_pagination_unit() {
        let f = fetcher();
        let url = f.search_url("site:yelp.com \"realtor\"", 0).unwrap();
        assert_eq!(url.host_str(), Some("www.google.com"));
        assert!(url.query().unwrap().contains("num=100"));
        assert!(url.query().unwrap().contains("start=0"));

        let url = f.search_url("q", 2).unwrap();
        assert!(url.query().unwrap().contains("start=200"));
    }

    #[test]
    fn test_search_url_encodes_query() {
        let f = fetcher();
        let url = f.search_url(r#""Dallas" "@gmail.com""#, 0).unwrap();
        assert!(!url.as_str().contains(' '));
        assert!(url.query().unwrap().starts_with("q="));
    }

    #[test]
    fn test_new_requires_token() {
        let config = Arc::new(Config::default());
        assert!(ProxyFetcher::new(config).is_err());
    }
}
