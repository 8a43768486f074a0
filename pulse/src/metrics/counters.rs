use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::adapter::FetchStatus;
use crate::feeds::AdapterId;

/// Fetch outcomes for one adapter. Read by the health endpoint to spot
/// degraded upstreams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    pub cache_hits: u64,
    pub circuit_open: u64,
    pub fresh: u64,
    pub not_modified: u64,
    pub errors: u64,
    pub last_status: Option<String>,
    pub last_latency_ms: Option<u64>,
}

#[derive(Clone, Default)]
pub struct FetchCounters {
    inner: Arc<Mutex<HashMap<AdapterId, AdapterStats>>>,
}

impl FetchCounters {
    pub fn record(&self, adapter: AdapterId, status: &FetchStatus, latency: Duration) {
        let mut map = self.inner.lock();
        let s = map.entry(adapter).or_default();

        match status {
            FetchStatus::CacheHit => s.cache_hits += 1,
            FetchStatus::CircuitOpen => s.circuit_open += 1,
            FetchStatus::Fresh(_) => s.fresh += 1,
            FetchStatus::NotModified => s.not_modified += 1,
            FetchStatus::Error => s.errors += 1,
        }

        s.last_status = Some(status.label());
        s.last_latency_ms = Some(latency.as_millis() as u64);
    }

    pub fn snapshot(&self, adapter: AdapterId) -> AdapterStats {
        self.inner.lock().get(&adapter).cloned().unwrap_or_default()
    }
}

/// Per-cycle counters for the auto-react loop. Observability only.
#[derive(Clone, Default)]
pub struct CycleCounters {
    pub cycles: Arc<AtomicU64>,
    pub stale_skips: Arc<AtomicU64>,
    pub events_emitted: Arc<AtomicU64>,
    pub cooldown_blocked: Arc<AtomicU64>,
    pub no_signal: Arc<AtomicU64>,
    pub store_errors: Arc<AtomicU64>,
}

impl CycleCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
