//! Metrics collection
//!
//! Counters, gauges and a latency histogram, all fire-and-forget: atomics
//! off the critical path, never consulted for correctness. Degradation to
//! fallback decisions is visible here rather than in any error path.

use crate::actor::action::ActionKind;
use crate::core::types::Provenance;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Upper bounds of the latency histogram buckets, in milliseconds.
/// A final unbounded bucket catches everything slower.
const LATENCY_BOUNDS_MS: [u64; 7] = [10, 50, 100, 250, 500, 1_000, 2_500];

#[derive(Debug, Default)]
pub struct MetricsCollector {
    decisions_cache_hit: AtomicU64,
    decisions_live: AtomicU64,
    decisions_fallback: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BOUNDS_MS.len() + 1],
    latency_total_ms: AtomicU64,
    latency_count: AtomicU64,
    live_actors: AtomicU64,
    cache_entries: AtomicU64,
    actions: Mutex<BTreeMap<&'static str, u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, provenance: Provenance, latency: Duration) {
        match provenance {
            Provenance::CacheHit => self.decisions_cache_hit.fetch_add(1, Ordering::Relaxed),
            Provenance::Live => self.decisions_live.fetch_add(1, Ordering::Relaxed),
            Provenance::Fallback => self.decisions_fallback.fetch_add(1, Ordering::Relaxed),
        };

        let ms = latency.as_millis() as u64;
        let bucket = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(LATENCY_BOUNDS_MS.len());
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_total_ms.fetch_add(ms, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action(&self, kind: ActionKind) {
        let mut actions = self.actions.lock().expect("metrics lock poisoned");
        *actions.entry(kind.as_str()).or_insert(0) += 1;
    }

    pub fn set_live_actors(&self, count: usize) {
        self.live_actors.store(count as u64, Ordering::Relaxed);
    }

    pub fn set_cache_entries(&self, count: usize) {
        self.cache_entries.store(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let count = self.latency_count.load(Ordering::Relaxed);
        let total = self.latency_total_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            decisions_cache_hit: self.decisions_cache_hit.load(Ordering::Relaxed),
            decisions_live: self.decisions_live.load(Ordering::Relaxed),
            decisions_fallback: self.decisions_fallback.load(Ordering::Relaxed),
            mean_latency_ms: if count == 0 { 0.0 } else { total as f64 / count as f64 },
            latency_buckets: self
                .latency_buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
            live_actors: self.live_actors.load(Ordering::Relaxed),
            cache_entries: self.cache_entries.load(Ordering::Relaxed),
            actions: self
                .actions
                .lock()
                .expect("metrics lock poisoned")
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

/// Point-in-time copy of all metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub decisions_cache_hit: u64,
    pub decisions_live: u64,
    pub decisions_fallback: u64,
    pub mean_latency_ms: f64,
    pub latency_buckets: Vec<u64>,
    pub live_actors: u64,
    pub cache_entries: u64,
    pub actions: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn decisions_total(&self) -> u64 {
        self.decisions_cache_hit + self.decisions_live + self.decisions_fallback
    }

    /// Fraction of decisions served by the fallback generator
    pub fn fallback_rate(&self) -> f64 {
        let total = self.decisions_total();
        if total == 0 {
            0.0
        } else {
            self.decisions_fallback as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_decision(Provenance::Live, Duration::from_millis(120));
        metrics.record_decision(Provenance::CacheHit, Duration::from_millis(1));
        metrics.record_decision(Provenance::Fallback, Duration::from_millis(5));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.decisions_live, 1);
        assert_eq!(snapshot.decisions_cache_hit, 1);
        assert_eq!(snapshot.decisions_fallback, 1);
        assert_eq!(snapshot.decisions_total(), 3);
    }

    #[test]
    fn test_latency_bucketing() {
        let metrics = MetricsCollector::new();
        metrics.record_decision(Provenance::Live, Duration::from_millis(5));
        metrics.record_decision(Provenance::Live, Duration::from_millis(600));
        metrics.record_decision(Provenance::Live, Duration::from_secs(10));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.latency_buckets[0], 1);
        assert_eq!(snapshot.latency_buckets[5], 1);
        assert_eq!(snapshot.latency_buckets[7], 1);
    }

    #[test]
    fn test_fallback_rate() {
        let metrics = MetricsCollector::new();
        for _ in 0..3 {
            metrics.record_decision(Provenance::Fallback, Duration::ZERO);
        }
        metrics.record_decision(Provenance::Live, Duration::ZERO);
        assert!((metrics.snapshot().fallback_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_action_counts() {
        let metrics = MetricsCollector::new();
        metrics.record_action(ActionKind::Work);
        metrics.record_action(ActionKind::Work);
        metrics.record_action(ActionKind::Rest);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.actions.get("work"), Some(&2));
        assert_eq!(snapshot.actions.get("rest"), Some(&1));
    }
}
