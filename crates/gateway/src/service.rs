//! Gateway service: the cache-aside execution pipeline.
//!
//! Each request moves through
//! `received -> key_derived -> cache_checked -> {hit_ready | miss_executing}
//! -> result_ready -> delivered`, or ends in `failed`. A hit never touches the
//! forwarder or writes to the cache. A miss calls the forwarder once and, on
//! success, writes the result once with the fixed TTL.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

use qpu_core::{
    config::LimitsConfig,
    fingerprint,
    traits::{ExecutionForwarder, ResultCache, DEFAULT_RESULT_TTL},
    types::{CacheKey, ExecutionRequest, ExecutionResult, ResultSource},
    Error, ErrorClass, Result,
};
use qpu_telemetry::{track_cache_degraded, track_forwarder_latency, track_request};

/// Ceiling on a single forwarder call when none is configured.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Stream of result frames for one request. Currently always exactly one.
pub type ResultStream = BoxStream<'static, ExecutionResult>;

/// A successfully answered request.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Fingerprint the request was served under.
    pub key: CacheKey,
    /// Whether the result came from the cache or the provider.
    pub source: ResultSource,
    /// The payload delivered to the client.
    pub result: ExecutionResult,
}

impl Execution {
    /// One-shot stream carrying the result.
    pub fn into_stream(self) -> ResultStream {
        stream::once(async move { self.result }).boxed()
    }
}

/// Orchestrates fingerprinting, cache lookup and forwarding.
///
/// Cheap to share: collaborators are behind `Arc` and the service holds no
/// per-request state.
pub struct GatewayService {
    cache: Arc<dyn ResultCache>,
    forwarder: Arc<dyn ExecutionForwarder>,
    ttl: Duration,
    limits: LimitsConfig,
    execution_timeout: Duration,
}

impl GatewayService {
    /// Create a service with the default 24 hour TTL and default limits.
    pub fn new(cache: Arc<dyn ResultCache>, forwarder: Arc<dyn ExecutionForwarder>) -> Self {
        Self {
            cache,
            forwarder,
            ttl: DEFAULT_RESULT_TTL,
            limits: LimitsConfig::default(),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    /// Set the TTL applied to every cache write.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set request limits.
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Bound how long a miss may wait on the forwarder.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// TTL applied to every cache write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Answer one request.
    pub async fn run(&self, request: ExecutionRequest) -> Result<Execution> {
        let trace_id = request.metadata.trace_id.clone().unwrap_or_default();
        let outcome = self.run_inner(request, &trace_id).await;

        match &outcome {
            Ok(execution) => {
                track_request(execution.source.as_str());
                tracing::debug!(
                    trace_id = %trace_id,
                    cache_key = %execution.key,
                    stage = "result_ready",
                    source = execution.source.as_str(),
                    "Result ready"
                );
            }
            Err(e) => {
                track_request(outcome_label(e));
                tracing::warn!(trace_id = %trace_id, stage = "failed", error = %e, "Request failed");
            }
        }

        outcome
    }

    /// Answer one request as a stream of result frames.
    pub async fn stream(&self, request: ExecutionRequest) -> Result<ResultStream> {
        Ok(self.run(request).await?.into_stream())
    }

    async fn run_inner(&self, request: ExecutionRequest, trace_id: &str) -> Result<Execution> {
        request.validate(&self.limits)?;
        let key = fingerprint::derive(&request);
        tracing::debug!(trace_id = %trace_id, cache_key = %key, stage = "key_derived", "Derived cache key");

        match self.cache.get(&key).await {
            Ok(Some(result)) => {
                tracing::info!(trace_id = %trace_id, cache_key = %key, stage = "hit_ready", "Cache hit");
                return Ok(Execution {
                    key,
                    source: ResultSource::Cache,
                    result,
                });
            }
            Ok(None) => {
                tracing::debug!(trace_id = %trace_id, cache_key = %key, stage = "cache_checked", "Cache miss");
            }
            Err(e) => {
                track_cache_degraded("get");
                tracing::warn!(
                    trace_id = %trace_id,
                    cache_key = %key,
                    error = %e,
                    "Cache lookup failed, treating as miss"
                );
            }
        }

        let result = self.execute_and_store(key, request, trace_id.to_string()).await?;
        Ok(Execution {
            key,
            source: ResultSource::Provider,
            result,
        })
    }

    /// Forward the request and cache the result.
    ///
    /// Runs on its own task: if the caller goes away mid-flight, the
    /// execution still finishes and lands in the cache for the next caller.
    /// The task never outlives the execution timeout.
    async fn execute_and_store(
        &self,
        key: CacheKey,
        request: ExecutionRequest,
        trace_id: String,
    ) -> Result<ExecutionResult> {
        let cache = self.cache.clone();
        let forwarder = self.forwarder.clone();
        let ttl = self.ttl;
        let limit = self.execution_timeout;

        let task = tokio::spawn(async move {
            tracing::info!(
                trace_id = %trace_id,
                cache_key = %key,
                stage = "miss_executing",
                provider = forwarder.name(),
                "Forwarding to execution provider"
            );

            let started = Instant::now();
            let outcome = match tokio::time::timeout(limit, forwarder.execute(&request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::upstream_timeout(format!(
                    "no result within {}s",
                    limit.as_secs_f64()
                ))),
            };
            track_forwarder_latency(
                forwarder.name(),
                outcome.is_ok(),
                started.elapsed().as_secs_f64(),
            );
            let result = outcome?;

            if let Err(e) = cache.put(&key, &result, ttl).await {
                track_cache_degraded("put");
                tracing::warn!(
                    trace_id = %trace_id,
                    cache_key = %key,
                    error = %e,
                    "Failed to cache result, delivering uncached"
                );
            }

            Ok::<ExecutionResult, Error>(result)
        });

        task.await
            .map_err(|e| Error::internal(format!("Execution task failed: {}", e)))?
    }
}

fn outcome_label(e: &Error) -> &'static str {
    match e.class() {
        ErrorClass::Client => "client_error",
        ErrorClass::Upstream => "upstream_error",
        ErrorClass::CacheDegraded | ErrorClass::Internal => "internal_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qpu_core::mocks::{ForwarderBehavior, MockForwarder, MockResultCache};
    use qpu_core::types::RequestMetadata;
    use qpu_store::InMemoryResultCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn request() -> ExecutionRequest {
        ExecutionRequest::new("X", 3, "qvm")
    }

    fn service(
        cache: Arc<dyn ResultCache>,
        forwarder: Arc<dyn ExecutionForwarder>,
    ) -> GatewayService {
        GatewayService::new(cache, forwarder)
    }

    #[tokio::test]
    async fn test_miss_executes_once_and_stores_once() {
        let cache = Arc::new(MockResultCache::new());
        let forwarder = Arc::new(MockForwarder::returning(vec![1, 0, 1]));
        let svc = service(cache.clone(), forwarder.clone());

        let execution = svc.run(request()).await.unwrap();

        assert_eq!(execution.source, ResultSource::Provider);
        assert_eq!(execution.result.ro, vec![1, 0, 1]);
        assert_eq!(forwarder.call_count(), 1);

        let puts = cache.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].key, execution.key);
        assert_eq!(puts[0].result, execution.result);
        assert_eq!(puts[0].ttl, Duration::from_secs(86400));
    }

    #[tokio::test]
    async fn test_hit_returns_stored_value_without_forwarding() {
        let key = fingerprint::derive(&request());
        let stored = ExecutionResult::new(vec![0, 1, 1]);
        let cache = Arc::new(MockResultCache::with_entries(vec![(key, stored.clone())]));
        let forwarder = Arc::new(MockForwarder::returning(vec![1, 1, 1]));
        let svc = service(cache.clone(), forwarder.clone());

        let execution = svc.run(request()).await.unwrap();

        assert_eq!(execution.source, ResultSource::Cache);
        assert_eq!(execution.result, stored);
        assert_eq!(forwarder.call_count(), 0);
        assert!(cache.puts().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_touches_nothing() {
        let cache = Arc::new(MockResultCache::new());
        let forwarder = Arc::new(MockForwarder::returning(vec![1]));
        let svc = service(cache.clone(), forwarder.clone());

        let err = svc.run(ExecutionRequest::new("X", 0, "qvm")).await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(cache.get_count(), 0);
        assert_eq!(forwarder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_cache_untouched() {
        for behavior in [
            ForwarderBehavior::Unreachable,
            ForwarderBehavior::Reject("bad program".into()),
            ForwarderBehavior::Timeout,
        ] {
            let cache = Arc::new(MockResultCache::new());
            let forwarder = Arc::new(MockForwarder::failing(behavior));
            let svc = service(cache.clone(), forwarder.clone());

            let err = svc.run(request()).await.unwrap_err();

            assert_eq!(err.class(), ErrorClass::Upstream);
            assert_eq!(forwarder.call_count(), 1);
            assert!(cache.puts().is_empty());
            assert!(cache.is_empty());
        }
    }

    #[tokio::test]
    async fn test_cache_get_failure_is_a_forced_miss() {
        let cache = Arc::new(MockResultCache::new());
        cache.fail_gets(true);
        let forwarder = Arc::new(MockForwarder::returning(vec![1, 0, 1]));
        let svc = service(cache.clone(), forwarder.clone());

        let execution = svc.run(request()).await.unwrap();

        assert_eq!(execution.source, ResultSource::Provider);
        assert_eq!(forwarder.call_count(), 1);
        assert_eq!(cache.puts().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_put_failure_still_delivers() {
        let cache = Arc::new(MockResultCache::new());
        cache.fail_puts(true);
        let forwarder = Arc::new(MockForwarder::returning(vec![1, 0, 1]));
        let svc = service(cache.clone(), forwarder.clone());

        let execution = svc.run(request()).await.unwrap();

        assert_eq!(execution.result.ro, vec![1, 0, 1]);
        assert_eq!(cache.puts().len(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_does_not_split_the_cache() {
        let cache = Arc::new(MockResultCache::new());
        let forwarder = Arc::new(MockForwarder::returning(vec![1, 0, 1]));
        let svc = service(cache.clone(), forwarder.clone());

        let first = request().with_metadata(RequestMetadata {
            client_id: Some("alice".into()),
            trace_id: Some("t-1".into()),
        });
        let second = request().with_metadata(RequestMetadata {
            client_id: Some("bob".into()),
            trace_id: Some("t-2".into()),
        });

        assert_eq!(svc.run(first).await.unwrap().source, ResultSource::Provider);
        assert_eq!(svc.run(second).await.unwrap().source, ResultSource::Cache);
        assert_eq!(forwarder.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worked_example_hit_then_expiry() {
        let cache = Arc::new(InMemoryResultCache::new());
        let forwarder = Arc::new(MockForwarder::returning(vec![1, 0, 1]));
        let svc = service(cache.clone(), forwarder.clone());

        let first = svc.run(request()).await.unwrap();
        assert_eq!(first.source, ResultSource::Provider);
        assert_eq!(first.result.ro, vec![1, 0, 1]);

        tokio::time::advance(Duration::from_secs(23 * 60 * 60)).await;
        let second = svc.run(request()).await.unwrap();
        assert_eq!(second.source, ResultSource::Cache);
        assert_eq!(second.result, first.result);
        assert_eq!(forwarder.call_count(), 1);

        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        let third = svc.run(request()).await.unwrap();
        assert_eq!(third.source, ResultSource::Provider);
        assert_eq!(forwarder.call_count(), 2);
    }

    #[tokio::test]
    async fn test_stream_yields_exactly_one_frame() {
        let svc = service(
            Arc::new(MockResultCache::new()),
            Arc::new(MockForwarder::returning(vec![1, 0, 1])),
        );

        let frames: Vec<_> = svc.stream(request()).await.unwrap().collect().await;

        assert_eq!(frames, vec![ExecutionResult::new(vec![1, 0, 1])]);
    }

    /// Blocks until released, counting calls.
    struct GatedForwarder {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionForwarder for GatedForwarder {
        async fn execute(&self, _request: &ExecutionRequest) -> Result<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(ExecutionResult::new(vec![1, 1, 0]))
        }
    }

    #[tokio::test]
    async fn test_abandoned_request_still_populates_cache() {
        let gate = Arc::new(Notify::new());
        let forwarder = Arc::new(GatedForwarder {
            gate: gate.clone(),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(MockResultCache::new());
        let svc = Arc::new(service(cache.clone(), forwarder.clone()));

        let caller = tokio::spawn({
            let svc = svc.clone();
            async move { svc.run(request()).await }
        });

        while forwarder.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        caller.abort();
        gate.notify_one();

        let key = fingerprint::derive(&request());
        for _ in 0..1000 {
            if cache.peek(&key).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(cache.peek(&key), Some(ExecutionResult::new(vec![1, 1, 0])));
    }

    /// Never answers; records when its in-flight call is dropped.
    #[derive(Default)]
    struct HungForwarder {
        calls: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    struct ReleaseOnDrop(Arc<AtomicUsize>);

    impl Drop for ReleaseOnDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ExecutionForwarder for HungForwarder {
        async fn execute(&self, _request: &ExecutionRequest) -> Result<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _release = ReleaseOnDrop(self.released.clone());
            std::future::pending::<Result<ExecutionResult>>().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_times_out() {
        let forwarder = Arc::new(HungForwarder::default());
        let cache = Arc::new(MockResultCache::new());
        let svc = service(cache.clone(), forwarder.clone())
            .with_execution_timeout(Duration::from_secs(10));

        let err = svc.run(request()).await.unwrap_err();

        assert!(matches!(err, Error::UpstreamTimeout(_)), "{:?}", err);
        assert_eq!(forwarder.released.load(Ordering::SeqCst), 1);
        assert!(cache.puts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_request_to_hung_provider_is_released() {
        let forwarder = Arc::new(HungForwarder::default());
        let cache = Arc::new(MockResultCache::new());
        let svc = Arc::new(
            service(cache.clone(), forwarder.clone())
                .with_execution_timeout(Duration::from_secs(10)),
        );

        let caller = tokio::spawn({
            let svc = svc.clone();
            async move { svc.run(request()).await }
        });
        while forwarder.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        caller.abort();

        for _ in 0..60 {
            if forwarder.released.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(forwarder.released.load(Ordering::SeqCst), 1);
        assert!(cache.puts().is_empty());
    }

    #[test]
    fn test_default_execution_timeout_is_bounded() {
        let svc = service(
            Arc::new(MockResultCache::new()),
            Arc::new(MockForwarder::returning(vec![])),
        );
        assert_eq!(svc.execution_timeout, DEFAULT_EXECUTION_TIMEOUT);
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_tolerated() {
        let cache = Arc::new(MockResultCache::new());
        let forwarder = Arc::new(MockForwarder::returning(vec![1, 0, 1]));
        let svc = Arc::new(service(cache.clone(), forwarder.clone()));

        let (a, b) = tokio::join!(svc.run(request()), svc.run(request()));

        assert_eq!(a.unwrap().result, b.unwrap().result);
        // Both may miss; each miss executes once and writes once.
        assert_eq!(forwarder.call_count(), cache.puts().len());
        assert_eq!(cache.len(), 1);
    }
}
