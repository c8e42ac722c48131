use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use gridql_api::{SeriesList, Timeseries};

use crate::provider::backend::{
    Backend, BackendError, FetchMultipleRequest, FetchRequest, MultiBackend,
};
use crate::runtime_error::{RuntimeError, RuntimeResult};

/// Default worker-pool size for the parallel multi-fetch.
pub const DEFAULT_PARALLELISM: usize = 20;

/// ParallelMultiFetch fans a batch of single fetches out over a bounded
/// worker pool. The first worker error cancels the shared token; the other
/// workers drop their in-flight requests and exit. The batch surfaces the
/// triggering error, never the resulting cancellations.
pub struct ParallelMultiFetch {
    backend: Arc<dyn Backend>,
    parallelism: usize,
}

impl ParallelMultiFetch {
    pub fn new(backend: Arc<dyn Backend>, parallelism: usize) -> Self {
        ParallelMultiFetch {
            backend,
            parallelism: parallelism.max(1),
        }
    }

    pub fn with_default_parallelism(backend: Arc<dyn Backend>) -> Self {
        ParallelMultiFetch::new(backend, DEFAULT_PARALLELISM)
    }
}

#[async_trait]
impl MultiBackend for ParallelMultiFetch {
    async fn fetch_multiple_series(
        &self,
        request: FetchMultipleRequest,
    ) -> RuntimeResult<SeriesList> {
        let _span = request
            .profiler
            .as_ref()
            .map(|p| p.record("fetch_multiple_series"));

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut workers: JoinSet<(usize, Result<Timeseries, BackendError>)> = JoinSet::new();

        for (index, metric) in request.metrics.iter().cloned().enumerate() {
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&semaphore);
            let single = FetchRequest {
                metric,
                sample_method: request.sample_method,
                timerange: request.timerange,
                cancel: request.cancel.clone(),
            };
            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (index, Err(BackendError::cancelled(single.metric)));
                };
                if single.cancel.is_cancelled() {
                    return (index, Err(BackendError::cancelled(single.metric)));
                }
                let result = backend.fetch_single_series(&single).await;
                if let Err(err) = &result {
                    if !err.is_cancelled() {
                        warn!(error = %err, "single fetch failed; cancelling batch");
                        single.cancel.cancel();
                    }
                }
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Timeseries, BackendError>>> =
            request.metrics.iter().map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(join_err) => {
                    request.cancel.cancel();
                    return Err(RuntimeError::General(format!(
                        "fetch worker failed: {join_err}"
                    )));
                }
            }
        }

        // the first real error in input order wins; cancellations only
        // surface when nothing triggered them from inside the batch
        let mut cancellation: Option<BackendError> = None;
        let mut series = Vec::with_capacity(results.len());
        for result in results.into_iter().flatten() {
            match result {
                Ok(ts) => series.push(ts),
                Err(err) if err.is_cancelled() => {
                    cancellation.get_or_insert(err);
                }
                Err(err) => return Err(RuntimeError::Backend(err)),
            }
        }
        if let Some(err) = cancellation {
            return Err(RuntimeError::Backend(err));
        }

        Ok(SeriesList::new(series, request.timerange))
    }
}

/// SequentialMultiFetch issues the batch one request at a time. Useful for
/// tests and debugging; semantics match the parallel pool.
pub struct SequentialMultiFetch {
    backend: Arc<dyn Backend>,
}

impl SequentialMultiFetch {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        SequentialMultiFetch { backend }
    }
}

#[async_trait]
impl MultiBackend for SequentialMultiFetch {
    async fn fetch_multiple_series(
        &self,
        request: FetchMultipleRequest,
    ) -> RuntimeResult<SeriesList> {
        let mut series = Vec::with_capacity(request.metrics.len());
        for metric in request.metrics.iter().cloned() {
            if request.cancel.is_cancelled() {
                return Err(RuntimeError::Backend(BackendError::cancelled(metric)));
            }
            let single = FetchRequest {
                metric,
                sample_method: request.sample_method,
                timerange: request.timerange,
                cancel: request.cancel.clone(),
            };
            series.push(self.backend.fetch_single_series(&single).await?);
        }
        Ok(SeriesList::new(series, request.timerange))
    }
}
