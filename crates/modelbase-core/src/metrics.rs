//! Global atomic counters for catalog builds and reloads.
//!
//! Counters are bumped silently at the call site. Call [`Metrics::flush`]
//! to emit the current values as one `tracing::info!` event, e.g. after a
//! build or at the end of a reload cycle.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    layers_built: AtomicU64,
    records_dropped: AtomicU64,
    models_excluded: AtomicU64,
    snapshots_published: AtomicU64,
    reloads_skipped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            layers_built: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            models_excluded: AtomicU64::new(0),
            snapshots_published: AtomicU64::new(0),
            reloads_skipped: AtomicU64::new(0),
        }
    }

    pub fn inc_layers_built(&self) {
        self.layers_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_records_dropped(&self, n: u64) {
        if n > 0 {
            self.records_dropped.fetch_add(n, Ordering::Relaxed);
            tracing::trace!(metric = "records_dropped", n, "counter incremented");
        }
    }

    pub fn add_models_excluded(&self, n: u64) {
        if n > 0 {
            self.models_excluded.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn inc_snapshots_published(&self) {
        self.snapshots_published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_published", "counter incremented");
    }

    pub fn inc_reloads_skipped(&self) {
        self.reloads_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            layers_built = self.layers_built(),
            records_dropped = self.records_dropped(),
            models_excluded = self.models_excluded(),
            snapshots_published = self.snapshots_published(),
            reloads_skipped = self.reloads_skipped(),
        );
    }

    pub fn layers_built(&self) -> u64 {
        self.layers_built.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    pub fn models_excluded(&self) -> u64 {
        self.models_excluded.load(Ordering::Relaxed)
    }

    pub fn snapshots_published(&self) -> u64 {
        self.snapshots_published.load(Ordering::Relaxed)
    }

    pub fn reloads_skipped(&self) -> u64 {
        self.reloads_skipped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.layers_built.store(0, Ordering::Relaxed);
        self.records_dropped.store(0, Ordering::Relaxed);
        self.models_excluded.store(0, Ordering::Relaxed);
        self.snapshots_published.store(0, Ordering::Relaxed);
        self.reloads_skipped.store(0, Ordering::Relaxed);
    }
}
