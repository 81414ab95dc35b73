//! Testing utilities including mock implementations.
//!
//! These let tests drive the scheduler, pipeline and orchestrator without
//! network access or real task bodies.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{FetchError, FetchResult, TaskError, TaskResult};
use crate::orchestrator::{DataChangeCounters, TaskContext, TaskHandler, TaskOutcome};
use crate::traits::{FetchResponse, Fetcher};

/// A mock fetcher for testing.
///
/// Returns predefined pages without making network requests.
#[derive(Default)]
pub struct MockFetcher {
    /// Predefined responses by URL
    pages: Arc<RwLock<HashMap<String, FetchResponse>>>,

    /// URLs that fail with the given HTTP status
    failures: Arc<RwLock<HashMap<String, u16>>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` for `url`.
    pub fn with_page(self, url: &str, content: &str, content_type: &str) -> Self {
        self.pages
            .write()
            .unwrap()
            .insert(url.to_string(), FetchResponse::ok(url, content, content_type));
        self
    }

    /// Answer `url` with an HTTP error status.
    pub fn fail_url(self, url: &str, status: u16) -> Self {
        self.failures.write().unwrap().insert(url.to_string(), status);
        self
    }

    /// Replace the content served for `url`.
    pub fn set_page(&self, url: &str, content: &str, content_type: &str) {
        self.pages
            .write()
            .unwrap()
            .insert(url.to_string(), FetchResponse::ok(url, content, content_type));
    }

    /// Get all URLs fetched so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> FetchResult<FetchResponse> {
        let key = url.to_string();
        self.calls.write().unwrap().push(key.clone());

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: key });
        }
        if let Some(status) = self.failures.read().unwrap().get(&key) {
            return Err(FetchError::Status {
                url: key,
                status: *status,
            });
        }
        self.pages
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(FetchError::Status {
                url: key,
                status: 404,
            })
    }
}

/// One scripted response of a [`ScriptedHandler`].
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Succeed,
    Fail(String),
    /// Block until the attempt is cancelled.
    Hang,
}

/// A task handler that plays back a script, then succeeds.
///
/// Tracks calls and the peak number of concurrent runs.
#[derive(Default)]
pub struct ScriptedHandler {
    script: RwLock<VecDeque<ScriptStep>>,
    delay: Option<Duration>,
    changes: DataChangeCounters,
    calls: AtomicUsize,
    running: Arc<AtomicUsize>,
    max_running: AtomicUsize,
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.push(ScriptStep::Fail(message.to_string()))
    }

    pub fn then_succeed(self) -> Self {
        self.push(ScriptStep::Succeed)
    }

    pub fn then_hang(self) -> Self {
        self.push(ScriptStep::Hang)
    }

    fn push(self, step: ScriptStep) -> Self {
        self.script.write().unwrap().push_back(step);
        self
    }

    /// Sleep this long in every run before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Data changes reported by successful runs.
    pub fn with_changes(mut self, changes: DataChangeCounters) -> Self {
        self.changes = changes;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    async fn run(&self, ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let step = self
            .script
            .write()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptStep::Succeed);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);
        let _guard = RunningGuard(Arc::clone(&self.running));

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match step {
            ScriptStep::Succeed => Ok(TaskOutcome::new().with_changes(self.changes)),
            ScriptStep::Fail(message) => Err(TaskError::failed(message)),
            ScriptStep::Hang => {
                ctx.cancel.cancelled().await;
                Err(TaskError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_fetcher_serves_and_fails() {
        let fetcher = MockFetcher::new()
            .with_page("https://a.gov.uk/", "<html></html>", "text/html")
            .fail_url("https://a.gov.uk/broken", 503);
        let cancel = CancellationToken::new();

        let page = fetcher
            .fetch(&Url::parse("https://a.gov.uk/").unwrap(), &cancel)
            .await
            .unwrap();
        assert_eq!(page.status_code, 200);

        let err = fetcher
            .fetch(&Url::parse("https://a.gov.uk/broken").unwrap(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let missing = fetcher
            .fetch(&Url::parse("https://a.gov.uk/missing").unwrap(), &cancel)
            .await
            .unwrap_err();
        assert!(!missing.is_retryable());
        assert_eq!(fetcher.calls().len(), 3);
    }
}
