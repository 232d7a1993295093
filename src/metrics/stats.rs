//! Counters shared by every handle of a cache.

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

#[derive(Default)]
pub(crate) struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    reclaimed: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn record_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Relaxed);
    }

    pub(crate) fn record_evictions(&self, n: u64) {
        if n > 0 {
            self.evictions.fetch_add(n, Relaxed);
        }
    }

    pub(crate) fn record_reclaimed(&self, n: u64) {
        if n > 0 {
            self.reclaimed.fetch_add(n, Relaxed);
        }
    }

    /// Counters are read one by one; a snapshot taken while other threads
    /// run need not match any single instant.
    pub(crate) fn snapshot(&self) -> Metrics {
        Metrics {
            hits: self.hits.load(Relaxed),
            misses: self.misses.load(Relaxed),
            evictions: self.evictions.load(Relaxed),
            reclaimed: self.reclaimed.load(Relaxed),
        }
    }
}

/// Cache counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Lookups that returned a live value.
    pub hits: u64,
    /// Lookups that found nothing, or only a reclaimed value.
    pub misses: u64,
    /// Entries evicted to make room.
    pub evictions: u64,
    /// Entries dropped because their value was reclaimed.
    pub reclaimed: u64,
}

impl Metrics {
    pub fn request_count(&self) -> u64 {
        self.hits + self.misses
    }

    /// Share of lookups that hit, `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = StatsCounter::default();
        assert_eq!(stats.snapshot(), Metrics::default());
        assert_eq!(stats.snapshot().hit_rate(), 0.0);

        stats.record_lookup(true);
        stats.record_lookup(true);
        stats.record_lookup(false);
        stats.record_lookup(true);
        stats.record_evictions(3);
        stats.record_reclaimed(0);
        stats.record_reclaimed(2);

        let m = stats.snapshot();
        assert_eq!((m.hits, m.misses, m.evictions, m.reclaimed), (3, 1, 3, 2));
        assert_eq!(m.request_count(), 4);
        assert_eq!(m.hit_rate(), 0.75);
    }
}
