//! Monitor configuration and PID input normalization.
//!
//! `MonitorConfig` is validated eagerly: a config that constructs
//! successfully is guaranteed usable by the engine. PID inputs are accepted
//! as integers or numeric strings via [`PidSpec`], mirroring how embedding
//! applications usually hold PIDs (parsed args, env vars, pidfiles).

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Process identifier as used throughout the crate.
pub type Pid = u32;

// Default configuration constants
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// A PID given either numerically or as a string.
///
/// Numeric strings are parsed; anything else fails normalization. Collection
/// inputs to [`crate::MemMonitor::add_watch_ids`] drop unparsable entries,
/// while config construction rejects them outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidSpec {
    Num(Pid),
    Str(String),
}

impl PidSpec {
    /// Normalizes to the canonical PID type, `None` if the string form does
    /// not parse as a PID.
    pub fn resolve(&self) -> Option<Pid> {
        match self {
            PidSpec::Num(pid) => Some(*pid),
            PidSpec::Str(s) => s.trim().parse().ok(),
        }
    }
}

impl From<Pid> for PidSpec {
    fn from(pid: Pid) -> Self {
        PidSpec::Num(pid)
    }
}

impl From<i32> for PidSpec {
    fn from(pid: i32) -> Self {
        // Negative values fail resolution later rather than panicking here.
        match Pid::try_from(pid) {
            Ok(p) => PidSpec::Num(p),
            Err(_) => PidSpec::Str(pid.to_string()),
        }
    }
}

impl From<&str> for PidSpec {
    fn from(s: &str) -> Self {
        PidSpec::Str(s.to_string())
    }
}

impl From<String> for PidSpec {
    fn from(s: String) -> Self {
        PidSpec::Str(s)
    }
}

/// Immutable monitor configuration.
///
/// Built via [`MonitorConfig::new`] / [`MonitorConfig::with_roots`] plus the
/// chained setters; validated on construction and again by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Root PIDs to watch (deduplicated, non-empty).
    pub root_pids: Vec<Pid>,

    /// How often the engine samples memory and refreshes descendants.
    pub poll_interval: Duration,

    /// Whether direct children of the root PIDs are discovered and watched.
    pub track_descendants: bool,

    /// Procfs mount point. Overridable for tests against a synthetic tree.
    pub proc_root: PathBuf,
}

impl MonitorConfig {
    /// Config watching a single root process with default settings.
    pub fn new(root: impl Into<PidSpec>) -> Result<Self, MonitorError> {
        Self::with_roots([root.into()])
    }

    /// Config watching a collection of root processes.
    ///
    /// Fails with `InvalidArgument` when the collection is empty or contains
    /// an entry that does not normalize to a PID.
    pub fn with_roots<I>(roots: I) -> Result<Self, MonitorError>
    where
        I: IntoIterator,
        I::Item: Into<PidSpec>,
    {
        let mut seen = BTreeSet::new();
        for spec in roots {
            let spec = spec.into();
            let pid = spec.resolve().ok_or_else(|| {
                MonitorError::InvalidArgument(format!("root PID {:?} is not a valid PID", spec))
            })?;
            seen.insert(pid);
        }

        if seen.is_empty() {
            return Err(MonitorError::InvalidArgument(
                "at least one root PID is required".into(),
            ));
        }

        Ok(Self {
            root_pids: seen.into_iter().collect(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            track_descendants: false,
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
        })
    }

    /// Sets the poll interval. Fails with `InvalidArgument` when zero.
    pub fn poll_interval(mut self, interval: Duration) -> Result<Self, MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidArgument(
                "poll interval must be positive".into(),
            ));
        }
        self.poll_interval = interval;
        Ok(self)
    }

    /// Enables or disables descendant tracking.
    pub fn track_descendants(mut self, enabled: bool) -> Self {
        self.track_descendants = enabled;
        self
    }

    /// Points the monitor at an alternative procfs root.
    pub fn proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    /// Re-checks the invariants the constructors establish. Used by the
    /// engine so a hand-assembled config cannot bypass validation.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.root_pids.is_empty() {
            return Err(MonitorError::InvalidArgument(
                "at least one root PID is required".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(MonitorError::InvalidArgument(
                "poll interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_single_root() {
        let cfg = MonitorConfig::new(1234u32).unwrap();
        assert_eq!(cfg.root_pids, vec![1234]);
        assert_eq!(
            cfg.poll_interval,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        );
        assert!(!cfg.track_descendants);
    }

    #[test]
    fn test_with_roots_deduplicates() {
        let cfg =
            MonitorConfig::with_roots([PidSpec::from(5u32), "5".into(), 7u32.into()]).unwrap();
        assert_eq!(cfg.root_pids, vec![5, 7]);
    }

    #[test]
    fn test_with_roots_empty_fails() {
        let err = MonitorConfig::with_roots(Vec::<PidSpec>::new()).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidArgument(_)));
    }

    #[test]
    fn test_with_roots_malformed_string_fails() {
        let err = MonitorConfig::with_roots(["not-a-pid"]).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_interval_fails() {
        let err = MonitorConfig::new(1u32)
            .unwrap()
            .poll_interval(Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidArgument(_)));
    }

    #[test]
    fn test_pid_spec_resolution() {
        assert_eq!(PidSpec::from(42u32).resolve(), Some(42));
        assert_eq!(PidSpec::from(" 42 ").resolve(), Some(42));
        assert_eq!(PidSpec::from("42").resolve(), Some(42));
        assert_eq!(PidSpec::from("forty-two").resolve(), None);
        assert_eq!(PidSpec::from("").resolve(), None);
        assert_eq!(PidSpec::from(-1i32).resolve(), None);
    }

    #[test]
    fn test_validate_hand_assembled() {
        let cfg = MonitorConfig {
            root_pids: vec![],
            poll_interval: Duration::from_secs(1),
            track_descendants: false,
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
        };
        assert!(cfg.validate().is_err());
    }
}
