//! reqwest-backed [`Fetcher`].
//!
//! No JavaScript rendering; static HTML, feeds and documents only.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::{FetchResponse, Fetcher};

pub const DEFAULT_USER_AGENT: &str = concat!("crawl-engine/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 5;

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.5",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.8"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    async fn request(&self, url: &Url) -> FetchResult<FetchResponse> {
        let started = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "text/html".to_string());
        let content = response
            .text()
            .await
            .map_err(|e| transport_error(url, e))?;
        let response_ms = started.elapsed().as_millis() as u64;

        debug!(url = %final_url, status = status.as_u16(), bytes = content.len(), response_ms, "Fetched");
        Ok(FetchResponse {
            url: final_url,
            content,
            content_type,
            status_code: status.as_u16(),
            headers,
            response_ms,
        })
    }
}

fn transport_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> FetchResult<FetchResponse> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled { url: url.to_string() }),
            result = self.request(url) => result,
        }
    }
}
