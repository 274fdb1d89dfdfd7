// Resolution statistics: where responses came from and how runtime stores fared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

struct StatsSample {
    at: Instant,
    served_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub network_fetches: u64,
    pub fallbacks: u64,
    pub failures: u64,
    pub runtime_stores: u64,
    pub runtime_store_failures: u64,
    pub serve_bps: u64,
    pub cache_hit_rate: f64,
}

pub struct ResolutionStats {
    cache_hits: AtomicU64,
    network_fetches: AtomicU64,
    fallbacks: AtomicU64,
    failures: AtomicU64,
    runtime_stores: AtomicU64,
    runtime_store_failures: AtomicU64,
    served_bytes_total: AtomicU64,
    last_sample: Mutex<StatsSample>,
}

impl ResolutionStats {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            network_fetches: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            runtime_stores: AtomicU64::new(0),
            runtime_store_failures: AtomicU64::new(0),
            served_bytes_total: AtomicU64::new(0),
            last_sample: Mutex::new(StatsSample {
                at: Instant::now(),
                served_bytes: 0,
            }),
        }
    }

    pub fn record_cache_hit(&self, bytes: u64) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.served_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_network(&self, bytes: u64) {
        self.network_fetches.fetch_add(1, Ordering::Relaxed);
        self.served_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_fallback(&self, bytes: u64) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        self.served_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Resolution that produced no response at all.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one runtime store attempt.
    pub fn record_runtime_store(&self, succeeded: bool) {
        self.runtime_stores.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.runtime_store_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let current_served = self.served_bytes_total.load(Ordering::Relaxed);

        let serve_bps = {
            let mut sample = self.last_sample.lock();
            let elapsed = now.duration_since(sample.at).as_secs_f64();
            let bps = if elapsed > 0.1 {
                ((current_served - sample.served_bytes) as f64 / elapsed) as u64
            } else {
                0
            };
            sample.at = now;
            sample.served_bytes = current_served;
            bps
        };

        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let network_fetches = self.network_fetches.load(Ordering::Relaxed);
        let fallbacks = self.fallbacks.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let resolved = cache_hits + network_fetches + fallbacks + failures;
        let cache_hit_rate = if resolved > 0 {
            cache_hits as f64 / resolved as f64
        } else {
            0.0
        };

        StatsSnapshot {
            cache_hits,
            network_fetches,
            fallbacks,
            failures,
            runtime_stores: self.runtime_stores.load(Ordering::Relaxed),
            runtime_store_failures: self.runtime_store_failures.load(Ordering::Relaxed),
            serve_bps,
            cache_hit_rate,
        }
    }
}

impl Default for ResolutionStats {
    fn default() -> Self {
        Self::new()
    }
}
