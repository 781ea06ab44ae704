//! Decision coordinator: cache, batch window, dedup, never-fails submit
//!
//! Turns N per-tick decision requests into a bounded stream of service
//! calls. `submit` always resolves — to a cached answer, a live answer,
//! or a fallback — but may be slow. A background batcher coalesces cache
//! misses into windows of up to `batch_size` requests or
//! `flush_interval`, whichever fills first. Requests sharing a
//! fingerprint collapse onto a single service call: within a window by
//! grouping, and across windows by attaching to the call already in
//! flight. All waiters for a fingerprint receive the same response.

use crate::core::config::DecisionConfig;
use crate::core::types::Provenance;
use crate::decision::cache::ResponseCache;
use crate::decision::client::DecisionClient;
use crate::decision::fallback::FallbackGenerator;
use crate::decision::rate_limit::RateLimiter;
use crate::decision::{DecisionRequest, DecisionResponse};
use crate::world::metrics::MetricsCollector;
use ahash::AHashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

struct BatchItem {
    request: DecisionRequest,
    reply: oneshot::Sender<DecisionResponse>,
}

/// Waiters keyed by the fingerprint of a call currently in flight
type PendingCalls = Arc<Mutex<AHashMap<u64, Vec<oneshot::Sender<DecisionResponse>>>>>;

pub struct DecisionCoordinator {
    cache: Arc<ResponseCache>,
    metrics: Arc<MetricsCollector>,
    fallback: FallbackGenerator,
    tx: mpsc::Sender<BatchItem>,
}

impl DecisionCoordinator {
    pub fn new(
        config: &DecisionConfig,
        client: Arc<DecisionClient>,
        cache: Arc<ResponseCache>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<MetricsCollector>,
    ) -> Arc<Self> {
        // Channel capacity bounds queued work; senders beyond it wait
        // (backpressure), they do not fail.
        let (tx, rx) = mpsc::channel(config.batch_size.max(1) * 32);

        tokio::spawn(batch_loop(
            rx,
            client,
            cache.clone(),
            limiter,
            metrics.clone(),
            config.batch_size.max(1),
            Duration::from_millis(config.flush_interval_ms),
        ));

        Arc::new(Self {
            cache,
            metrics,
            fallback: FallbackGenerator::new(),
            tx,
        })
    }

    /// Submit one request and wait for its decision. Never fails.
    pub async fn submit(&self, request: DecisionRequest) -> DecisionResponse {
        let started = Instant::now();

        if let Some(text) = self.cache.get(request.fingerprint) {
            let latency = started.elapsed();
            self.metrics.record_decision(Provenance::CacheHit, latency);
            return DecisionResponse {
                text,
                provenance: Provenance::CacheHit,
                latency,
            };
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let item = BatchItem {
            request: request.clone(),
            reply: reply_tx,
        };

        if self.tx.send(item).await.is_err() {
            // Batcher gone (shutdown race); still resolve the caller.
            return self.resolve_fallback(&request, started);
        }

        match reply_rx.await {
            Ok(response) => response,
            Err(_) => self.resolve_fallback(&request, started),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn resolve_fallback(&self, request: &DecisionRequest, started: Instant) -> DecisionResponse {
        let latency = started.elapsed();
        self.metrics.record_decision(Provenance::Fallback, latency);
        DecisionResponse {
            text: self.fallback.generate(request),
            provenance: Provenance::Fallback,
            latency,
        }
    }
}

async fn batch_loop(
    mut rx: mpsc::Receiver<BatchItem>,
    client: Arc<DecisionClient>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let pending: PendingCalls = Arc::new(Mutex::new(AHashMap::new()));

    while let Some(first) = rx.recv().await {
        let mut items = vec![first];
        let window_closes = Instant::now() + flush_interval;

        while items.len() < batch_size {
            match tokio::time::timeout_at(window_closes, rx.recv()).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        // Partition the window: resolve what the cache already answers,
        // attach duplicates to calls in flight, and collect the
        // fingerprints that genuinely need a new call.
        let mut to_call = Vec::new();
        for item in items {
            let fingerprint = item.request.fingerprint;

            if let Some(text) = cache.get(fingerprint) {
                metrics.record_decision(Provenance::CacheHit, Duration::ZERO);
                let _ = item.reply.send(DecisionResponse {
                    text,
                    provenance: Provenance::CacheHit,
                    latency: Duration::ZERO,
                });
                continue;
            }

            let mut pending_map = pending.lock().expect("pending lock poisoned");
            match pending_map.entry(fingerprint) {
                Entry::Occupied(mut waiters) => waiters.get_mut().push(item.reply),
                Entry::Vacant(slot) => {
                    slot.insert(vec![item.reply]);
                    to_call.push(item.request);
                }
            }
        }

        for request in to_call {
            tokio::spawn(dispatch_call(
                request,
                client.clone(),
                cache.clone(),
                limiter.clone(),
                metrics.clone(),
                pending.clone(),
            ));
        }
    }
    tracing::debug!("decision batcher stopped");
}

/// One rate-limited service call for one unique fingerprint. Resolves
/// every waiter that accumulated while the call was in flight. Runs as
/// its own task so a slow call never blocks the next window.
async fn dispatch_call(
    request: DecisionRequest,
    client: Arc<DecisionClient>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    pending: PendingCalls,
) {
    limiter.acquire().await;
    let started = Instant::now();

    let response = match client.call(&request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                actor = %request.actor,
                error = %e,
                "decision call exhausted retries, serving fallback"
            );
            let latency = started.elapsed();
            metrics.record_decision(Provenance::Fallback, latency);
            DecisionResponse {
                text: FallbackGenerator::new().generate(&request),
                provenance: Provenance::Fallback,
                latency,
            }
        }
    };

    if response.provenance == Provenance::Live {
        cache.put(request.fingerprint, &response.text, request.tick);
    }

    let waiters = pending
        .lock()
        .expect("pending lock poisoned")
        .remove(&request.fingerprint)
        .unwrap_or_default();
    for reply in waiters {
        // A waiter that gave up (engine shutdown) is fine to drop.
        let _ = reply.send(response.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{AgoraError, Result};
    use crate::core::types::ActorId;
    use crate::decision::client::{DecisionService, OfflineDecisionService};
    use crate::decision::GenerationParams;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts calls; always answers the same text.
    struct CountingService {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DecisionService for CountingService {
        async fn generate(&self, _: &str, _: &GenerationParams) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("rest".into())
        }
    }

    /// Counts calls and holds each for a while before answering.
    struct SlowCountingService {
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    #[async_trait]
    impl DecisionService for SlowCountingService {
        async fn generate(&self, _: &str, _: &GenerationParams) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok("rest".into())
        }
    }

    fn test_config() -> DecisionConfig {
        DecisionConfig {
            max_retries: 2,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
            flush_interval_ms: 10,
            batch_size: 64,
            rate_limit_per_second: 10_000.0,
            burst: 100.0,
            ..DecisionConfig::default()
        }
    }

    fn coordinator_with(
        service: Arc<dyn DecisionService>,
        config: &DecisionConfig,
    ) -> Arc<DecisionCoordinator> {
        let metrics = Arc::new(MetricsCollector::new());
        let cache = Arc::new(ResponseCache::new(config.cache_capacity));
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_per_second,
            config.burst,
        ));
        let client = Arc::new(DecisionClient::new(service, metrics.clone(), config));
        DecisionCoordinator::new(config, client, cache, limiter, metrics)
    }

    fn request(actor: u64, context: &str) -> DecisionRequest {
        DecisionRequest {
            actor: ActorId(actor),
            tick: 0,
            context: context.into(),
            fingerprint: crate::decision::context::fingerprint(context),
            params: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_fingerprints_one_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator_with(
            Arc::new(CountingService {
                calls: calls.clone(),
            }),
            &test_config(),
        );

        let mut handles = Vec::new();
        for actor in 0..10 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.submit(request(actor, "shared context")).await
            }));
        }

        for handle in handles {
            let response = handle.await.unwrap();
            assert_eq!(response.text, "rest");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dedup_spans_windows_while_call_in_flight() {
        // Tiny windows force the duplicates across several batches; the
        // slow call keeps the fingerprint pending the whole time.
        let calls = Arc::new(AtomicU32::new(0));
        let config = DecisionConfig {
            batch_size: 2,
            flush_interval_ms: 1,
            ..test_config()
        };
        let coordinator = coordinator_with(
            Arc::new(SlowCountingService {
                calls: calls.clone(),
                delay: Duration::from_millis(200),
            }),
            &config,
        );

        let mut handles = Vec::new();
        for actor in 0..20 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.submit(request(actor, "shared context")).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().text, "rest");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_fingerprints_distinct_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator_with(
            Arc::new(CountingService {
                calls: calls.clone(),
            }),
            &test_config(),
        );

        for actor in 0..3 {
            coordinator
                .submit(request(actor, &format!("context {}", actor)))
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_live_results_populate_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator_with(
            Arc::new(CountingService {
                calls: calls.clone(),
            }),
            &test_config(),
        );

        let first = coordinator.submit(request(1, "ctx")).await;
        assert_eq!(first.provenance, Provenance::Live);

        let second = coordinator.submit(request(2, "ctx")).await;
        assert_eq!(second.provenance, Provenance::CacheHit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_resolves_with_fallback() {
        let coordinator = coordinator_with(Arc::new(OfflineDecisionService), &test_config());

        let response = coordinator.submit(request(1, "ctx")).await;
        assert_eq!(response.provenance, Provenance::Fallback);
        assert!(!response.text.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_results_are_not_cached() {
        let coordinator = coordinator_with(Arc::new(OfflineDecisionService), &test_config());
        coordinator.submit(request(1, "ctx")).await;
        assert_eq!(coordinator.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_fallback_is_scoped_to_failing_context() {
        // One failing call must not poison a later distinct context.
        struct FirstFails {
            calls: Arc<AtomicU32>,
        }
        #[async_trait]
        impl DecisionService for FirstFails {
            async fn generate(&self, context: &str, _: &GenerationParams) -> Result<String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if context == "bad" {
                    Err(AgoraError::ServiceUnavailable("bad context".into()))
                } else {
                    Ok("work".into())
                }
            }
        }

        let coordinator = coordinator_with(
            Arc::new(FirstFails {
                calls: Arc::new(AtomicU32::new(0)),
            }),
            &test_config(),
        );

        let bad = coordinator.submit(request(1, "bad")).await;
        assert_eq!(bad.provenance, Provenance::Fallback);

        let good = coordinator.submit(request(2, "good")).await;
        assert_eq!(good.provenance, Provenance::Live);
        assert_eq!(good.text, "work");
    }
}
