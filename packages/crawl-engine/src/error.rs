//! Typed errors for the crawl engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure kind; the binary wraps these with `anyhow` context.

use thiserror::Error;
use uuid::Uuid;

use crate::types::TaskId;

/// Errors surfaced by a [`Fetcher`](crate::traits::Fetcher).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, reset)
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Request exceeded the fetcher timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// The caller's cancellation token fired mid-request
    #[error("fetch cancelled: {url}")]
    Cancelled { url: String },

    /// The URL could not be fetched at all
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Whether the task layer should retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Cancelled { .. } | FetchError::InvalidUrl { .. } => false,
        }
    }

    /// URL the error refers to.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Network { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Cancelled { url }
            | FetchError::InvalidUrl { url } => url,
        }
    }
}

/// Errors from a [`Storage`](crate::traits::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the crawl scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL has no host: {0}")]
    NoHost(String),

    #[error("no crawl target registered for domain {0}")]
    UnknownDomain(String),

    #[error("URL not in queue: {0}")]
    NotQueued(String),

    #[error("invalid rule pattern {pattern}: {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors from content extraction.
///
/// Most extraction problems are non-fatal and reported as
/// [`ExtractionIssue`](crate::extraction::ExtractionIssue) values instead.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("empty content")]
    EmptyContent,
}

/// Errors from the deduplication engine.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("cannot merge record {0} into itself")]
    SelfMerge(Uuid),
}

/// Errors from URL discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Error returned by a task body.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("scheduler failed: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("deduplication failed: {0}")]
    Dedup(#[from] DedupError),

    #[error("task cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

/// Errors from the task orchestrator's control surface.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: TaskId },

    #[error("invalid cron schedule {schedule}: {message}")]
    InvalidSchedule { schedule: String, message: String },

    #[error("dependencies not satisfied for task {0}")]
    DependenciesNotMet(TaskId),

    #[error("maintenance mode active; dispatch suppressed")]
    MaintenanceMode,

    #[error("orchestrator already running")]
    AlreadyRunning,

    #[error("orchestrator not running")]
    NotRunning,

    #[error("task {0} is disabled")]
    TaskDisabled(TaskId),
}

/// Errors while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse targets file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Result type alias for deduplication operations.
pub type DedupResult<T> = std::result::Result<T, DedupError>;

/// Result type alias for task bodies.
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
