//! Error types for the memory monitor.

/// Errors surfaced by the public monitor API.
///
/// Per-process read failures and discovery failures are absorbed internally
/// (the affected PID is omitted from the tick, the previous child list is
/// retained); they never appear here.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Malformed construction or watch-set input. Fatal to the call, not to
    /// a running engine.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `initialize()` was called on an engine that has already been stopped.
    #[error("monitor has been stopped")]
    AlreadyStopped,

    /// The aggregator was asked to merge an empty snapshot map.
    #[error("cannot aggregate an empty snapshot map")]
    EmptyAggregateInput,
}
