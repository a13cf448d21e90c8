//! Node metric counters / 节点指标计数器

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Node-wide atomic counters / 节点级原子计数器
#[derive(Default)]
pub struct Metrics {
    pub documents_enqueued: AtomicU64,
    pub documents_indexed: AtomicU64,
    pub batches_failed: AtomicU64,
    pub searches: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_invalidations: AtomicU64,
}

/// Snapshot for the stats endpoint / 统计接口用的快照
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub documents_enqueued: u64,
    pub documents_indexed: u64,
    pub batches_failed: u64,
    pub searches: u64,
    pub cache_hits: u64,
    pub cache_invalidations: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_enqueued: self.documents_enqueued.load(Ordering::SeqCst),
            documents_indexed: self.documents_indexed.load(Ordering::SeqCst),
            batches_failed: self.batches_failed.load(Ordering::SeqCst),
            searches: self.searches.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
            cache_invalidations: self.cache_invalidations.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.add(&metrics.documents_enqueued, 3);
        metrics.add(&metrics.searches, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_enqueued, 3);
        assert_eq!(snapshot.searches, 1);
        assert_eq!(snapshot.documents_indexed, 0);
    }
}
