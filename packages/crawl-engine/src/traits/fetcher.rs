use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::FetchResult;

/// A fetched document as handed to the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub content: String,
    pub content_type: String,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub response_ms: u64,
}

impl FetchResponse {
    /// A 200 response with the given body and content type.
    pub fn ok(url: impl Into<String>, content: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            content_type: content_type.into(),
            status_code: 200,
            headers: HashMap::new(),
            response_ms: 0,
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Fetches a URL.
///
/// Implementations must stop in-flight I/O when `cancel` fires and return
/// [`FetchError::Cancelled`](crate::error::FetchError::Cancelled).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> FetchResult<FetchResponse>;
}
