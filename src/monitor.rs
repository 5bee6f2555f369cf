//! The polling engine.
//!
//! `MemMonitor` owns the watch set (explicit PIDs plus discovered children)
//! and two periodic activities sharing one interval: child discovery (only
//! when enabled) and snapshot collection. Each collection tick reads every
//! watched PID in parallel, builds a fresh snapshot map, swaps it in behind
//! an `Arc`, and broadcasts it to subscribers. PIDs whose read fails are
//! omitted from that tick; an empty map is a valid emission meaning "no
//! observable processes".
//!
//! A process read failure never stops the schedule. Once initialized, the
//! engine has no fatal runtime error path; it degrades to fewer processes
//! reporting.

use crate::config::{MonitorConfig, Pid, PidSpec};
use crate::error::MonitorError;
use crate::proc::page_size;
use crate::proc::{ProcfsSnapshotReader, ProcfsTreeDiscoverer, SnapshotReader, TreeDiscoverer};
use crate::sample::{self, MemorySample, SnapshotMap};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Engine lifecycle: Created -> Initialized -> Stopped.
const STATE_CREATED: u8 = 0;
const STATE_INITIALIZED: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Broadcast capacity for the snapshot channel. A subscriber that falls
/// further behind than this sees a lag error on `recv` and resyncs.
const SUBSCRIBER_CAPACITY: usize = 100;

/// State shared between the engine handle and its background tasks.
struct Shared {
    reader: Arc<dyn SnapshotReader>,
    discoverer: Arc<dyn TreeDiscoverer>,
    root_pids: Vec<Pid>,
    /// Explicitly registered PIDs; mutated by `add_watch_ids`.
    explicit: RwLock<BTreeSet<Pid>>,
    /// Latest discovery result, handed off wholesale as an immutable list.
    children: RwLock<Arc<Vec<Pid>>>,
    /// Latest published snapshot, replaced atomically each tick.
    snapshot: RwLock<Arc<SnapshotMap>>,
    /// Fan-out channel; `stop()` drops the sender so blocked subscribers
    /// observe closure instead of waiting for a tick that never comes.
    tx: Mutex<Option<broadcast::Sender<Arc<SnapshotMap>>>>,
    /// Serializes snapshot publication against `stop()`: once `stop()` has
    /// taken this lock after cancelling, no tick can still emit.
    emit_lock: Mutex<()>,
    page_size: AtomicU64,
}

/// Periodic resident-memory monitor for a set of processes.
///
/// ```no_run
/// use herakles_mem_monitor::{MemMonitor, MonitorConfig};
///
/// # async fn example() -> Result<(), herakles_mem_monitor::MonitorError> {
/// let config = MonitorConfig::new(1234u32)?.track_descendants(true);
/// let monitor = MemMonitor::new(config)?;
///
/// let mut snapshots = monitor.subscribe();
/// monitor.initialize().await?;
///
/// while let Ok(map) = snapshots.recv().await {
///     println!("{} processes visible", map.len());
/// }
/// monitor.stop();
/// # Ok(())
/// # }
/// ```
pub struct MemMonitor {
    config: MonitorConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    state: AtomicU8,
}

impl MemMonitor {
    /// Creates a monitor backed by the procfs tree named in the config.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        let reader = Arc::new(ProcfsSnapshotReader::new(&config.proc_root));
        let discoverer = Arc::new(ProcfsTreeDiscoverer::new(&config.proc_root));
        Self::with_collaborators(config, reader, discoverer)
    }

    /// Creates a monitor with injected collaborators. This is the seam tests
    /// and non-procfs platforms use.
    pub fn with_collaborators(
        config: MonitorConfig,
        reader: Arc<dyn SnapshotReader>,
        discoverer: Arc<dyn TreeDiscoverer>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;

        let explicit: BTreeSet<Pid> = config.root_pids.iter().copied().collect();
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                reader,
                discoverer,
                root_pids: config.root_pids.clone(),
                explicit: RwLock::new(explicit),
                children: RwLock::new(Arc::new(Vec::new())),
                snapshot: RwLock::new(Arc::new(SnapshotMap::default())),
                tx: Mutex::new(Some(tx)),
                emit_lock: Mutex::new(()),
                page_size: AtomicU64::new(page_size::DEFAULT_PAGE_SIZE),
            }),
            config,
            cancel: CancellationToken::new(),
            state: AtomicU8::new(STATE_CREATED),
        })
    }

    /// Resolves the page size and arms the periodic tasks.
    ///
    /// When descendant tracking is enabled, one discovery pass runs here
    /// before the schedules are armed, so the first emitted snapshot already
    /// covers children. Calling `initialize` on an initialized engine is a
    /// no-op; on a stopped engine it fails with `AlreadyStopped`.
    pub async fn initialize(&self) -> Result<(), MonitorError> {
        match self.state.compare_exchange(
            STATE_CREATED,
            STATE_INITIALIZED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_STOPPED) => return Err(MonitorError::AlreadyStopped),
            Err(_) => {
                debug!("initialize called on an initialized monitor, ignoring");
                return Ok(());
            }
        }

        self.shared
            .page_size
            .store(page_size::resolve(), Ordering::Relaxed);

        info!(
            "memory monitor initialized: {} root PID(s), {}ms interval, page size {} bytes",
            self.shared.root_pids.len(),
            self.config.poll_interval.as_millis(),
            self.shared.page_size.load(Ordering::Relaxed),
        );

        if self.config.track_descendants {
            refresh_children(&self.shared);

            let shared = Arc::clone(&self.shared);
            let cancel = self.cancel.clone();
            let period = self.config.poll_interval;
            tokio::spawn(run_discovery(shared, cancel, period));
        }

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let period = self.config.poll_interval;
        tokio::spawn(run_collection(shared, cancel, period));

        Ok(())
    }

    /// Registers additional PIDs to watch. Entries that do not normalize to
    /// a PID are dropped with a debug log. New PIDs are picked up by the
    /// next tick, not one already in flight.
    pub fn add_watch_ids<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<PidSpec>,
    {
        let mut explicit = self
            .shared
            .explicit
            .write()
            .expect("explicit set lock poisoned");
        for spec in ids {
            let spec = spec.into();
            match spec.resolve() {
                Some(pid) => {
                    explicit.insert(pid);
                }
                None => debug!("dropping malformed watch id {:?}", spec),
            }
        }
    }

    /// Registers a single PID to watch.
    pub fn add_watch_id(&self, id: impl Into<PidSpec>) {
        self.add_watch_ids([id.into()]);
    }

    /// The deduplicated union of explicit PIDs and the most recently
    /// discovered children, sorted.
    pub fn watch_set(&self) -> Vec<Pid> {
        compute_watch_set(&self.shared)
    }

    /// The last published snapshot. Empty before the first tick completes.
    pub fn latest(&self) -> Arc<SnapshotMap> {
        Arc::clone(&self.shared.snapshot.read().expect("snapshot lock poisoned"))
    }

    /// Sums the latest snapshot into a single record.
    /// Fails with `EmptyAggregateInput` when nothing has been sampled.
    pub fn merged(&self) -> Result<MemorySample, MonitorError> {
        sample::merge(&self.latest())
    }

    /// Subscribes to per-tick snapshot emissions. Every completed tick sends
    /// the full current map, including empty ones. After `stop()` the
    /// returned receiver reports `Closed` immediately.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SnapshotMap>> {
        match self
            .shared
            .tx
            .lock()
            .expect("subscriber channel lock poisoned")
            .as_ref()
        {
            Some(tx) => tx.subscribe(),
            None => {
                // Channel already torn down; hand out a receiver whose
                // sender is gone so `recv` yields `Closed` right away.
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Page size in bytes used for conversion (resolved at `initialize`).
    pub fn page_size(&self) -> u64 {
        self.shared.page_size.load(Ordering::Relaxed)
    }

    /// Cancels both schedules and detaches all subscribers. Idempotent;
    /// once `stop` returns, no further snapshot is published or broadcast,
    /// even if a tick was in flight, and blocked `recv` calls observe
    /// `Closed`.
    pub fn stop(&self) {
        if self.state.swap(STATE_STOPPED, Ordering::AcqRel) == STATE_STOPPED {
            return;
        }
        self.cancel.cancel();
        // An emission that already passed its cancellation check finishes
        // before this lock is granted; every later tick observes the cancel.
        let _guard = self.shared.emit_lock.lock().expect("emit lock poisoned");
        // Dropping the sender closes the channel for every subscriber.
        self.shared
            .tx
            .lock()
            .expect("subscriber channel lock poisoned")
            .take();
        info!("memory monitor stopped");
    }
}

impl Drop for MemMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Union of explicit and discovered PIDs, deduplicated.
fn compute_watch_set(shared: &Shared) -> Vec<Pid> {
    let mut set: BTreeSet<Pid> = shared
        .explicit
        .read()
        .expect("explicit set lock poisoned")
        .iter()
        .copied()
        .collect();
    let children = Arc::clone(&shared.children.read().expect("children lock poisoned"));
    set.extend(children.iter().copied());
    set.into_iter().collect()
}

/// One discovery pass over all roots, as a single enumeration. A failed
/// pass keeps the previous list, since a stale tree is closer to the truth
/// than an empty one.
fn refresh_children(shared: &Shared) {
    match shared.discoverer.children_of_all(&shared.root_pids) {
        Ok(kids) => {
            let combined: BTreeSet<Pid> = kids.into_iter().collect();
            let list: Arc<Vec<Pid>> = Arc::new(combined.into_iter().collect());
            *shared.children.write().expect("children lock poisoned") = list;
        }
        Err(e) => {
            warn!("child discovery failed: {}, keeping previous list", e);
        }
    }
}

/// One collection pass: snapshot the watch set, read every PID in parallel,
/// keep the successes.
fn collect_once(shared: &Shared) -> Arc<SnapshotMap> {
    let watch = compute_watch_set(shared);
    let page_size = shared.page_size.load(Ordering::Relaxed);

    let samples: Vec<(Pid, MemorySample)> = watch
        .par_iter()
        .filter_map(|&pid| shared.reader.read(pid, page_size).map(|s| (pid, s)))
        .collect();

    debug!(
        "sampled {} of {} watched processes",
        samples.len(),
        watch.len()
    );
    Arc::new(samples.into_iter().collect())
}

/// Periodic snapshot collection until cancelled.
async fn run_collection(shared: Arc<Shared>, cancel: CancellationToken, period: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("collection task cancelled");
                break;
            }
            _ = interval.tick() => {
                let map = collect_once(&shared);

                let _guard = shared.emit_lock.lock().expect("emit lock poisoned");
                if cancel.is_cancelled() {
                    // Computed reads are discarded, not published.
                    break;
                }
                *shared.snapshot.write().expect("snapshot lock poisoned") = Arc::clone(&map);
                // No live subscribers is fine; the swap above still serves
                // `latest()` readers.
                if let Some(tx) = shared
                    .tx
                    .lock()
                    .expect("subscriber channel lock poisoned")
                    .as_ref()
                {
                    let _ = tx.send(map);
                }
            }
        }
    }
}

/// Periodic child-list refresh until cancelled.
async fn run_discovery(shared: Arc<Shared>, cancel: CancellationToken, period: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("discovery task cancelled");
                break;
            }
            _ = interval.tick() => {
                refresh_children(&shared);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct NoopReader;

    impl SnapshotReader for NoopReader {
        fn read(&self, _pid: Pid, _page_size: u64) -> Option<MemorySample> {
            None
        }
    }

    struct FixedChildren(Vec<Pid>);

    impl TreeDiscoverer for FixedChildren {
        fn children_of(&self, _root: Pid) -> io::Result<Vec<Pid>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDiscovery;

    impl TreeDiscoverer for FailingDiscovery {
        fn children_of(&self, _root: Pid) -> io::Result<Vec<Pid>> {
            Err(io::Error::other("enumeration failed"))
        }
    }

    fn monitor_with(children: Vec<Pid>) -> MemMonitor {
        let config = MonitorConfig::with_roots([10u32, 20u32]).unwrap();
        MemMonitor::with_collaborators(
            config,
            Arc::new(NoopReader),
            Arc::new(FixedChildren(children)),
        )
        .unwrap()
    }

    #[test]
    fn test_watch_set_deduplicates_explicit_and_discovered() {
        let monitor = monitor_with(vec![20, 30]);
        // Simulate a completed discovery pass.
        refresh_children(&monitor.shared);

        assert_eq!(monitor.watch_set(), vec![10, 20, 30]);
    }

    #[test]
    fn test_add_watch_ids_drops_malformed_strings() {
        let monitor = monitor_with(vec![]);
        monitor.add_watch_ids(["30", "junk", "40"]);

        assert_eq!(monitor.watch_set(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_add_watch_id_scalar() {
        let monitor = monitor_with(vec![]);
        monitor.add_watch_id(99u32);

        assert_eq!(monitor.watch_set(), vec![10, 20, 99]);
    }

    #[test]
    fn test_failed_discovery_keeps_previous_list() {
        let config = MonitorConfig::new(10u32).unwrap();
        let monitor = MemMonitor::with_collaborators(
            config,
            Arc::new(NoopReader),
            Arc::new(FailingDiscovery),
        )
        .unwrap();

        // Seed a previous discovery result, then fail a refresh.
        *monitor.shared.children.write().unwrap() = Arc::new(vec![55]);
        refresh_children(&monitor.shared);

        assert_eq!(monitor.watch_set(), vec![10, 55]);
    }

    #[test]
    fn test_merged_before_first_tick_is_empty_input() {
        let monitor = monitor_with(vec![]);
        assert!(matches!(
            monitor.merged(),
            Err(MonitorError::EmptyAggregateInput)
        ));
    }

    #[tokio::test]
    async fn test_initialize_twice_is_noop() {
        let monitor = monitor_with(vec![]);
        monitor.initialize().await.unwrap();
        monitor.initialize().await.unwrap();
        monitor.stop();
    }

    #[tokio::test]
    async fn test_initialize_after_stop_fails() {
        let monitor = monitor_with(vec![]);
        monitor.stop();
        assert!(matches!(
            monitor.initialize().await,
            Err(MonitorError::AlreadyStopped)
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let monitor = monitor_with(vec![]);
        monitor.initialize().await.unwrap();
        monitor.stop();
        monitor.stop();
    }
}
