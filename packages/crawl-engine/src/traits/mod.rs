//! Collaborator contracts the engine depends on.

pub mod fetcher;
pub mod storage;

pub use fetcher::{FetchResponse, Fetcher};
pub use storage::{SimilarityQuery, Storage};
