//! statm reading for a single process.
//!
//! `/proc/<pid>/statm` is a single line of seven page counts. Reads are
//! expected to race with process exit, so a missing or unreadable file is a
//! normal outcome, reported as `None` rather than an error.

use crate::config::Pid;
use crate::sample::{MemorySample, RawStatm};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of per-process memory samples.
///
/// The engine only depends on this trait; tests substitute an in-memory
/// implementation to drive ticks without a real /proc.
pub trait SnapshotReader: Send + Sync {
    /// Reads and converts one process's memory record. `None` means the
    /// process no longer exists or its record was unreadable or malformed;
    /// the caller omits that PID from the current tick.
    fn read(&self, pid: Pid, page_size: u64) -> Option<MemorySample>;
}

/// Reads statm records from a procfs tree.
#[derive(Debug, Clone)]
pub struct ProcfsSnapshotReader {
    proc_root: PathBuf,
}

impl ProcfsSnapshotReader {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn statm_path(&self, pid: Pid) -> PathBuf {
        self.proc_root.join(pid.to_string()).join("statm")
    }
}

impl SnapshotReader for ProcfsSnapshotReader {
    fn read(&self, pid: Pid, page_size: u64) -> Option<MemorySample> {
        let raw = read_statm(&self.statm_path(pid))?;
        Some(MemorySample::from_pages(raw, page_size))
    }
}

/// Reads and parses a statm file. Each call opens and drops its own handle.
fn read_statm(path: &Path) -> Option<RawStatm> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            // Process exit between discovery and read lands here.
            debug!("statm read failed for {}: {}", path.display(), e);
            return None;
        }
    };

    let raw = RawStatm::parse(&content);
    if raw.is_none() {
        debug!("malformed statm record at {}", path.display());
    }
    raw
}
