//! Mock source adapter for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::source::{FetchRequest, Payload, SourceAdapter, SourceError, SourceFetch};

/// A recorded fetch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    /// The request the adapter received.
    pub request: FetchRequest,
    /// When the fetch started.
    pub timestamp: Instant,
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed(SourceFetch),
    Fail(SourceError),
    Panic,
    Hang,
}

/// Mock implementation of the SourceAdapter trait.
///
/// Provides controllable behavior for testing:
/// - Return a configurable payload and related ids
/// - Fail, panic, or never return
/// - Add latency to every call
/// - Track calls and the peak number of concurrent calls
///
/// Clones share state, so a test can keep a handle after handing the
/// adapter to a registry.
///
/// # Example
///
/// ```rust,ignore
/// use caseflow_core::testing::{MockSourceAdapter, fixtures};
///
/// let adapter = MockSourceAdapter::succeeding(
///     "pje",
///     fixtures::payload(&[("value", 100.0.into())]),
///     &["CASE-002"],
/// )
/// .with_latency(Duration::from_millis(200));
///
/// registry.register_system("pje", Arc::new(adapter.clone()));
/// // ... run the pipeline ...
/// assert_eq!(adapter.fetch_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockSourceAdapter {
    name: String,
    behavior: Arc<RwLock<Behavior>>,
    latency: Arc<RwLock<Duration>>,
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter even when the fetch panics or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSourceAdapter {
    fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior: Arc::new(RwLock::new(behavior)),
            latency: Arc::new(RwLock::new(Duration::ZERO)),
            fetches: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Adapter that succeeds with an empty payload.
    pub fn new(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Succeed(SourceFetch::default()))
    }

    /// Adapter that succeeds with the given payload and related ids.
    pub fn succeeding(name: &str, data: Payload, related: &[&str]) -> Self {
        Self::with_behavior(
            name,
            Behavior::Succeed(SourceFetch {
                data,
                related: related.iter().map(|s| s.to_string()).collect(),
            }),
        )
    }

    /// Adapter that always returns `error`.
    pub fn failing(name: &str, error: SourceError) -> Self {
        Self::with_behavior(name, Behavior::Fail(error))
    }

    /// Adapter that panics inside `fetch`.
    pub fn panicking(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Panic)
    }

    /// Adapter whose `fetch` never completes.
    pub fn hanging(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Hang)
    }

    /// Add a fixed delay before every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Arc::new(RwLock::new(latency));
        self
    }

    /// Succeed with this payload on subsequent calls.
    pub async fn set_response(&self, data: Payload, related: &[&str]) {
        *self.behavior.write().await = Behavior::Succeed(SourceFetch {
            data,
            related: related.iter().map(|s| s.to_string()).collect(),
        });
    }

    /// Fail with this error on subsequent calls.
    pub async fn set_error(&self, error: SourceError) {
        *self.behavior.write().await = Behavior::Fail(error);
    }

    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = latency;
    }

    /// Get recorded fetches.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Get the number of fetches performed.
    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Highest number of fetches that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockSourceAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceFetch, SourceError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        self.fetches.write().await.push(RecordedFetch {
            request: request.clone(),
            timestamp: Instant::now(),
        });

        let latency = *self.latency.read().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let behavior = self.behavior.read().await.clone();
        match behavior {
            Behavior::Succeed(fetch) => Ok(fetch),
            Behavior::Fail(error) => Err(error),
            Behavior::Panic => panic!("mock adapter {} panicked", self.name),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PayloadValue;

    fn request() -> FetchRequest {
        FetchRequest {
            target_id: "CASE-001".to_string(),
            endpoint: None,
            credentials: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_succeeding_adapter_records_calls() {
        let mut data = Payload::new();
        data.insert("value".to_string(), PayloadValue::Number(100.0));
        let adapter = MockSourceAdapter::succeeding("pje", data, &["CASE-002"]);

        let fetch = adapter.fetch(&request()).await.unwrap();
        assert_eq!(fetch.related, vec!["CASE-002"]);
        assert_eq!(adapter.fetch_count().await, 1);
        assert_eq!(adapter.recorded_fetches().await[0].request.target_id, "CASE-001");
        assert_eq!(adapter.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_set_error_switches_behavior() {
        let adapter = MockSourceAdapter::new("pje");
        assert!(adapter.fetch(&request()).await.is_ok());

        adapter.set_error(SourceError::Timeout).await;
        assert_eq!(adapter.fetch(&request()).await.unwrap_err(), SourceError::Timeout);
    }

    #[tokio::test]
    async fn test_peak_concurrency_tracks_overlap() {
        let adapter = MockSourceAdapter::new("pje").with_latency(Duration::from_millis(50));
        let req = request();

        let _ = futures::future::join3(
            adapter.fetch(&req),
            adapter.fetch(&req),
            adapter.fetch(&req),
        )
        .await;

        assert_eq!(adapter.peak_concurrency(), 3);
        assert_eq!(adapter.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_latency_delays_every_call() {
        let adapter = MockSourceAdapter::new("pje");

        tokio_test::block_on(async {
            adapter.set_latency(Duration::from_millis(30)).await;
            let start = Instant::now();
            tokio_test::assert_ok!(adapter.fetch(&request()).await);
            assert!(start.elapsed() >= Duration::from_millis(30));
        });
    }

    #[tokio::test]
    async fn test_hanging_adapter_times_out() {
        let adapter = MockSourceAdapter::hanging("pje");
        let result =
            tokio::time::timeout(Duration::from_millis(20), adapter.fetch(&request())).await;

        assert!(result.is_err());
        assert_eq!(adapter.in_flight.load(Ordering::SeqCst), 0);
    }
}
