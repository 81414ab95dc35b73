//! Crawl Intelligence & Orchestration Engine
//!
//! Keeps a corpus of local-government content fresh: finds URLs worth
//! crawling, schedules them by importance and freshness, extracts structured
//! civic records, deduplicates them against the corpus and runs the whole
//! cycle as cron-scheduled tasks under monitoring.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crawl_engine::{CrawlEngine, EngineConfig, TaskOrchestrator};
//! use crawl_engine::engine::{register_standard_tasks, TaskSchedules};
//!
//! let config = EngineConfig::from_env()?;
//! let engine = Arc::new(CrawlEngine::new(/* components */));
//! engine.seed(&config.seed_urls).await;
//!
//! let orchestrator = Arc::new(TaskOrchestrator::new(config.orchestrator_config(), monitoring));
//! register_standard_tasks(&orchestrator, engine, &TaskSchedules::default()).await?;
//! orchestrator.start().await?;
//! ```
//!
//! # Modules
//!
//! - [`discovery`] - Link harvesting, filtering and scoring
//! - [`scheduler`] - Priority crawl queue with per-domain rate limits
//! - [`extraction`] - Content analysis and civic entity extraction
//! - [`dedup`] - Multi-strategy duplicate detection and merging
//! - [`orchestrator`] - Cron tasks with dependencies, retries and timeouts
//! - [`monitoring`] - Errors, timings, health, alerts and crawl sessions
//! - [`engine`] - The pipeline tying them together
//! - [`testing`] - Mock implementations for testing

pub mod config;
pub mod dedup;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod fetch;
pub mod monitoring;
pub mod orchestrator;
pub mod scheduler;
pub mod similarity;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::EngineConfig;
pub use dedup::DeduplicationEngine;
pub use discovery::UrlDiscovery;
pub use engine::{CrawlEngine, PipelineConfig};
pub use error::{
    ConfigError, DedupError, DiscoveryError, ExtractionError, FetchError, OrchestratorError,
    SchedulerError, StorageError, TaskError,
};
pub use extraction::ContentExtractor;
pub use fetch::HttpFetcher;
pub use monitoring::MonitoringService;
pub use orchestrator::TaskOrchestrator;
pub use scheduler::CrawlScheduler;
pub use stores::MemoryStorage;
pub use traits::{Fetcher, Storage};
