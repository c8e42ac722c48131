use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gridql_api::{MetricKey, SampleMethod, TagSet, TaggedMetric, Timerange, Timeseries};

use crate::provider::{
    Backend, BackendError, BackendErrorKind, FetchMultipleRequest, FetchRequest, MultiBackend,
    ParallelMultiFetch, SequentialMultiFetch,
};
use crate::runtime_error::RuntimeError;

/// Serves canned values per tag set; any tag set marked as failing yields
/// an I/O error. Tracks how many fetches actually ran.
struct CannedBackend {
    data: HashMap<String, Vec<f64>>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl CannedBackend {
    fn new(data: &[(&str, Vec<f64>)]) -> Self {
        CannedBackend {
            data: data
                .iter()
                .map(|(tags, values)| (tags.to_string(), values.clone()))
                .collect(),
            failing: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_failing(mut self, tags: &str) -> Self {
        self.failing.push(tags.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for CannedBackend {
    async fn fetch_single_series(
        &self,
        request: &FetchRequest,
    ) -> Result<Timeseries, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = request.metric.tag_set.serialize();
        if self.failing.contains(&key) {
            return Err(BackendError::new(
                request.metric.clone(),
                BackendErrorKind::FetchIo("canned failure".to_string()),
            ));
        }
        match self.data.get(&key) {
            Some(values) => Ok(Timeseries::new(
                values.clone(),
                request.metric.tag_set.clone(),
            )),
            None => Err(BackendError::new(
                request.metric.clone(),
                BackendErrorKind::InvalidSeries("unknown series".to_string()),
            )),
        }
    }
}

/// A backend that blocks until cancelled, to prove workers drop in-flight
/// requests promptly.
struct HangingBackend;

#[async_trait]
impl Backend for HangingBackend {
    async fn fetch_single_series(
        &self,
        request: &FetchRequest,
    ) -> Result<Timeseries, BackendError> {
        request.cancel.cancelled().await;
        Err(BackendError::cancelled(request.metric.clone()))
    }
}

fn tagged(key: &str, tags: &str) -> TaggedMetric {
    TaggedMetric::new(MetricKey::from(key), TagSet::parse(tags))
}

fn multi_request(metrics: Vec<TaggedMetric>) -> FetchMultipleRequest {
    FetchMultipleRequest {
        metrics,
        sample_method: SampleMethod::Mean,
        timerange: Timerange::new(0, 60, 30).unwrap(),
        cancel: CancellationToken::new(),
        profiler: None,
    }
}

#[tokio::test]
async fn test_parallel_fetch_assembles_all_series() {
    let backend = Arc::new(CannedBackend::new(&[
        ("host=a", vec![1.0, 2.0, 3.0]),
        ("host=b", vec![4.0, 5.0, 6.0]),
        ("host=c", vec![7.0, 8.0, 9.0]),
    ]));
    let fetcher = ParallelMultiFetch::new(backend.clone(), 2);

    let list = fetcher
        .fetch_multiple_series(multi_request(vec![
            tagged("cpu", "host=a"),
            tagged("cpu", "host=b"),
            tagged("cpu", "host=c"),
        ]))
        .await
        .unwrap();

    assert_eq!(list.series.len(), 3);
    assert_eq!(backend.calls(), 3);
    // order carries no meaning; compare as a set keyed by tag set
    for (tags, values) in [
        ("host=a", vec![1.0, 2.0, 3.0]),
        ("host=b", vec![4.0, 5.0, 6.0]),
        ("host=c", vec![7.0, 8.0, 9.0]),
    ] {
        assert!(list
            .series
            .iter()
            .any(|s| s.tag_set.serialize() == tags && s.values == values));
    }
}

#[tokio::test]
async fn test_parallel_fetch_surfaces_triggering_error() {
    let backend = Arc::new(
        CannedBackend::new(&[("host=a", vec![1.0]), ("host=c", vec![3.0])])
            .with_failing("host=b"),
    );
    let fetcher = ParallelMultiFetch::new(backend, 4);

    let err = fetcher
        .fetch_multiple_series(multi_request(vec![
            tagged("cpu", "host=a"),
            tagged("cpu", "host=b"),
            tagged("cpu", "host=c"),
        ]))
        .await
        .unwrap_err();

    match err {
        RuntimeError::Backend(err) => {
            assert_eq!(err.metric.tag_set.serialize(), "host=b");
            assert!(matches!(err.kind, BackendErrorKind::FetchIo(_)));
        }
        other => panic!("expected a backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_parallel_fetch_error_cancels_in_flight_workers() {
    // one request fails fast, the rest would hang forever without the
    // cancellation broadcast
    struct SplitBackend;

    #[async_trait]
    impl Backend for SplitBackend {
        async fn fetch_single_series(
            &self,
            request: &FetchRequest,
        ) -> Result<Timeseries, BackendError> {
            if request.metric.tag_set.value_or_empty("host") == "bad" {
                return Err(BackendError::new(
                    request.metric.clone(),
                    BackendErrorKind::FetchTimeout,
                ));
            }
            request.cancel.cancelled().await;
            Err(BackendError::cancelled(request.metric.clone()))
        }
    }

    let fetcher = ParallelMultiFetch::new(Arc::new(SplitBackend), 4);
    let err = fetcher
        .fetch_multiple_series(multi_request(vec![
            tagged("cpu", "host=slow1"),
            tagged("cpu", "host=bad"),
            tagged("cpu", "host=slow2"),
        ]))
        .await
        .unwrap_err();

    // the timeout triggered the cancellation, and the cancellations
    // themselves never win
    match err {
        RuntimeError::Backend(err) => {
            assert_eq!(err.metric.tag_set.serialize(), "host=bad");
            assert!(matches!(err.kind, BackendErrorKind::FetchTimeout));
        }
        other => panic!("expected a backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_parallel_fetch_external_cancellation() {
    let fetcher = ParallelMultiFetch::new(Arc::new(HangingBackend), 2);
    let mut request = multi_request(vec![tagged("cpu", "host=a"), tagged("cpu", "host=b")]);
    request.cancel = CancellationToken::new();
    request.cancel.cancel();

    let err = fetcher.fetch_multiple_series(request).await.unwrap_err();
    match err {
        RuntimeError::Backend(err) => assert!(err.is_cancelled()),
        other => panic!("expected a cancelled backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sequential_fetch_matches_parallel_semantics() {
    let backend = Arc::new(CannedBackend::new(&[
        ("host=a", vec![1.0]),
        ("host=b", vec![2.0]),
    ]));
    let fetcher = SequentialMultiFetch::new(backend);

    let list = fetcher
        .fetch_multiple_series(multi_request(vec![
            tagged("cpu", "host=a"),
            tagged("cpu", "host=b"),
        ]))
        .await
        .unwrap();
    assert_eq!(list.series.len(), 2);

    let failing = Arc::new(CannedBackend::new(&[]).with_failing("host=z"));
    let fetcher = SequentialMultiFetch::new(failing);
    let err = fetcher
        .fetch_multiple_series(multi_request(vec![tagged("cpu", "host=z")]))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Backend(_)));
}
