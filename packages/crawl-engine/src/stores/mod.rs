//! Storage implementations.
//!
//! Available backends:
//! - `MemoryStorage` - In-memory storage with similarity emulation

pub mod memory;

pub use memory::MemoryStorage;
