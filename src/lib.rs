//! Herakles Memory Monitor Library
//!
//! An embeddable poller that periodically samples resident-memory statistics
//! for a configurable set of processes (optionally including their direct
//! children) from `/proc/<pid>/statm`, and pushes each complete per-PID
//! snapshot to subscribers.
//!
//! # Features
//!
//! - **Watch set with child discovery**: explicit PIDs plus periodically
//!   refreshed direct children of the roots, deduplicated
//! - **Churn-tolerant sampling**: processes exiting between discovery and
//!   read are simply omitted from that tick
//! - **Consistent snapshots**: each tick publishes a fresh immutable map;
//!   readers never observe partial state
//! - **Cancellable schedule**: `stop()` is idempotent and suppresses any
//!   in-flight emission
//!
//! # Usage
//!
//! ```no_run
//! use herakles_mem_monitor::{merge, MemMonitor, MonitorConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), herakles_mem_monitor::MonitorError> {
//! let config = MonitorConfig::new(1234u32)?
//!     .poll_interval(Duration::from_millis(500))?
//!     .track_descendants(true);
//!
//! let monitor = MemMonitor::new(config)?;
//! let mut snapshots = monitor.subscribe();
//! monitor.initialize().await?;
//!
//! if let Ok(map) = snapshots.recv().await {
//!     for (pid, sample) in map.iter() {
//!         println!("{}: {:.2} MB resident", pid, sample.resident);
//!     }
//!     if let Ok(total) = merge(&map) {
//!         println!("total: {:.2} MB resident", total.resident);
//!     }
//! }
//!
//! monitor.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod proc;
pub mod sample;

// Re-export main types for convenience
pub use config::{MonitorConfig, Pid, PidSpec, DEFAULT_POLL_INTERVAL_MS};
pub use error::MonitorError;
pub use monitor::MemMonitor;
pub use proc::{
    ProcfsSnapshotReader, ProcfsTreeDiscoverer, SnapshotReader, TreeDiscoverer, DEFAULT_PAGE_SIZE,
};
pub use sample::{merge, MemorySample, RawStatm, SnapshotMap};
