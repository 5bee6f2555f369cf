//! Memory sample types and aggregation.
//!
//! A [`MemorySample`] is one process's statm record converted to megabytes;
//! a [`SnapshotMap`] is the full per-PID result of one collection tick. Maps
//! are built fresh every tick and published behind an `Arc`, never mutated
//! in place, so readers always see a complete, consistent snapshot.

use crate::config::Pid;
use crate::error::MonitorError;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = (1024 * 1024) as f64;

/// Per-PID memory samples from one collection tick.
pub type SnapshotMap = AHashMap<Pid, MemorySample>;

/// Raw page counts as read from `/proc/<pid>/statm`, in statm field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawStatm {
    pub size: u64,
    pub resident: u64,
    pub share: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dt: u64,
}

impl RawStatm {
    /// Parses the seven whitespace-separated page counts of a statm line.
    /// Returns `None` when the line is short or any field is non-numeric.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace().map(|f| f.parse::<u64>());
        let mut next = || fields.next()?.ok();

        Some(Self {
            size: next()?,
            resident: next()?,
            share: next()?,
            text: next()?,
            lib: next()?,
            data: next()?,
            dt: next()?,
        })
    }
}

/// One process's memory accounting at one instant, in megabytes.
///
/// Derived from raw statm page counts: `pages * page_size / 2^20`. The `lib`
/// and `dt` fields are always 0 on modern kernels but are carried for statm
/// format fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemorySample {
    /// Total program size (VmSize).
    pub size: f64,
    /// Resident set size (VmRSS).
    pub resident: f64,
    /// Resident shared pages.
    pub share: f64,
    /// Text (code) pages.
    pub text: f64,
    /// Library pages (unused since Linux 2.6; always 0).
    pub lib: f64,
    /// Data + stack pages.
    pub data: f64,
    /// Dirty pages (unused since Linux 2.6; always 0).
    pub dt: f64,
}

impl MemorySample {
    /// Converts raw page counts to megabytes using the given page size.
    pub fn from_pages(raw: RawStatm, page_size: u64) -> Self {
        let to_mb = |pages: u64| pages as f64 * page_size as f64 / BYTES_PER_MB;

        Self {
            size: to_mb(raw.size),
            resident: to_mb(raw.resident),
            share: to_mb(raw.share),
            text: to_mb(raw.text),
            lib: to_mb(raw.lib),
            data: to_mb(raw.data),
            dt: to_mb(raw.dt),
        }
    }
}

/// Sums every field across all entries of a snapshot map.
///
/// Field-wise addition is order-independent, so the result does not depend
/// on map iteration order. An empty map is an `EmptyAggregateInput` error
/// rather than a zero record; summation over zero processes has no meaning
/// and callers should treat it explicitly.
pub fn merge(snapshot: &SnapshotMap) -> Result<MemorySample, MonitorError> {
    if snapshot.is_empty() {
        return Err(MonitorError::EmptyAggregateInput);
    }

    let mut total = MemorySample::default();
    for sample in snapshot.values() {
        total.size += sample.size;
        total.resident += sample.resident;
        total.share += sample.share;
        total.text += sample.text;
        total.lib += sample.lib;
        total.data += sample.data;
        total.dt += sample.dt;
    }
    Ok(total)
}
