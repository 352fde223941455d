//! Resource monitoring: the abort flag, the memory monitor and the
//! frame-paced yielder.
//!
//! The memory probe is an external collaborator: the engine only needs a
//! callable returning process memory in bytes, or `None` where no
//! approximation exists (which disables the threshold). The default reads
//! `/proc/self/statm` on Linux.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use harvest_core::PlanError;
use harvest_search::LoadMonitor;

/// Process-memory probe contract. Returns bytes, or `None` when the host
/// offers no approximation.
pub type MemoryProbe = Arc<dyn Fn() -> Option<u64> + Send + Sync>;

/// The default probe: resident set size from `/proc/self/statm`.
pub fn default_memory_probe() -> MemoryProbe {
    Arc::new(|| {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        // Page size on every target this engine ships to.
        Some(resident_pages * 4096)
    })
}

/// Process-wide abort signal. Cloned handles share one flag.
#[derive(Clone, Debug, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Samples the memory probe every `interval` operations and trips the
/// abort flag at the configured threshold. Shared across the sequential
/// loop and every worker; the counter is global on purpose, the cadence
/// is per process, not per thread.
pub struct MemoryMonitor {
    probe: MemoryProbe,
    threshold_bytes: u64,
    interval: u64,
    ops: AtomicU64,
    peak_bytes: AtomicU64,
    flag: AbortFlag,
}

impl MemoryMonitor {
    pub fn new(probe: MemoryProbe, threshold_gb: f64, interval: u64) -> Self {
        let threshold_bytes = (threshold_gb * (1u64 << 30) as f64) as u64;
        Self {
            probe,
            threshold_bytes,
            interval: interval.max(1),
            ops: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(0),
            flag: AbortFlag::default(),
        }
    }

    pub fn flag(&self) -> AbortFlag {
        self.flag.clone()
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    /// The abort state as a result, for callers that propagate errors.
    pub fn check(&self) -> Result<(), PlanError> {
        if self.flag.is_set() {
            Err(PlanError::MemoryExceeded)
        } else {
            Ok(())
        }
    }

    /// Probe now, regardless of the operation cadence. Dispatchers call
    /// this whenever they return. `true` means the threshold was hit.
    pub fn sample(&self) -> bool {
        let Some(bytes) = (self.probe)() else {
            return false;
        };
        self.peak_bytes.fetch_max(bytes, Ordering::Relaxed);
        if bytes >= self.threshold_bytes {
            warn!(
                target: "plan.monitor",
                bytes,
                threshold = self.threshold_bytes,
                "memory threshold exceeded, aborting search"
            );
            self.flag.set();
            return true;
        }
        debug!(target: "plan.monitor", bytes, "memory sample");
        false
    }
}

impl LoadMonitor for MemoryMonitor {
    fn checkpoint(&self) -> bool {
        let n = self.ops.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.interval == 0 {
            self.sample();
        }
        self.flag.is_set()
    }

    fn aborted(&self) -> bool {
        self.flag.is_set()
    }
}

/// Frame-paced cooperative yield. On thread-per-worker hosts this is
/// nearly a no-op; an embedding host multiplexing the engine with other
/// work gets a scheduling point once per frame budget.
pub struct Yielder {
    budget: Duration,
    frame_start: Instant,
}

impl Default for Yielder {
    fn default() -> Self {
        Self::new(Duration::from_micros(16_667)) // one 60 Hz frame
    }
}

impl Yielder {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            frame_start: Instant::now(),
        }
    }

    /// Yield the thread if the current frame budget is spent.
    pub fn maybe_yield(&mut self) {
        if self.frame_start.elapsed() >= self.budget {
            std::thread::yield_now();
            self.frame_start = Instant::now();
        }
    }
}
