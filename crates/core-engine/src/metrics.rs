//! Metrics (§4.H): a lock-free ring buffer per named operation. The producer (hot) path writes a
//! single relaxed atomic per event; stats are computed on demand from a snapshot, never on the
//! hot path itself.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub const RING_CAPACITY: usize = 4096;

/// Fixed-capacity ring of the latest `RING_CAPACITY` recorded values (nanoseconds, typically).
/// Writers never block and never allocate; `u64::MAX` marks a slot that has not been written yet
/// so an early snapshot doesn't report bogus zeros as real samples.
pub struct LatencyRingBuffer {
    slots: Box<[AtomicU64; RING_CAPACITY]>,
    next: AtomicUsize,
    written: AtomicUsize,
}

impl Default for LatencyRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRingBuffer {
    pub fn new() -> Self {
        Self {
            slots: Box::new(std::array::from_fn(|_| AtomicU64::new(u64::MAX))),
            next: AtomicUsize::new(0),
            written: AtomicUsize::new(0),
        }
    }

    /// Record one sample. The only hot-path-visible cost: one `fetch_add` and one `store`, both
    /// `Relaxed` (§4.H, §5: "Metrics buffers: `Vec<AtomicU64>` writers, snapshot-only readers").
    #[inline]
    pub fn record(&self, value_ns: u64) {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % RING_CAPACITY;
        self.slots[idx].store(value_ns, Ordering::Relaxed);
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of every written slot, for `LatencyStats::compute`.
    pub fn snapshot(&self) -> Vec<u64> {
        self.slots
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .filter(|&v| v != u64::MAX)
            .collect()
    }

    pub fn total_written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
}

impl LatencyStats {
    /// Sort a snapshot and compute count/mean/percentiles/min/max (§4.H). Returns the default
    /// (all-zero) stats for an empty snapshot rather than panicking on an out-of-range index.
    pub fn compute(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        let count = samples.len();
        let sum: u128 = samples.iter().map(|&v| v as u128).sum();
        let mean_ns = sum as f64 / count as f64;
        let pct = |p: f64| -> u64 {
            let idx = ((p * count as f64) as usize).min(count - 1);
            samples[idx]
        };
        Self {
            count,
            mean_ns,
            p50_ns: pct(0.50),
            p95_ns: pct(0.95),
            p99_ns: pct(0.99),
            min_ns: samples[0],
            max_ns: samples[count - 1],
        }
    }
}
