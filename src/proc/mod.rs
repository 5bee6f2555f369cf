//! Procfs shims consumed by the monitor engine.
//!
//! This module provides:
//! - `statm`: per-process memory record reading and conversion
//! - `children`: child process discovery via PPid matching
//! - `page_size`: system page size with static fallback

pub mod children;
pub mod page_size;
pub mod statm;

// Re-export commonly used types
pub use children::{list_pids, ProcfsTreeDiscoverer, TreeDiscoverer};
pub use page_size::DEFAULT_PAGE_SIZE;
pub use statm::{ProcfsSnapshotReader, SnapshotReader};
