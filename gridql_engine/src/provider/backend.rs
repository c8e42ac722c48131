use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use gridql_api::{NamingError, SampleMethod, SeriesList, TaggedMetric, Timerange, Timeseries};

use crate::profile::Profiler;
use crate::runtime_error::RuntimeResult;

/// FetchRequest contains all the information to fetch a single series from
/// a backend.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// The metric to fetch.
    pub metric: TaggedMetric,
    /// Up/downsampling behavior.
    pub sample_method: SampleMethod,
    /// The time range to fetch data from.
    pub timerange: Timerange,
    /// Shared cancellation signal for the owning query.
    pub cancel: CancellationToken,
}

/// FetchMultipleRequest fans a batch of single fetches out to a backend.
#[derive(Clone)]
pub struct FetchMultipleRequest {
    pub metrics: Vec<TaggedMetric>,
    pub sample_method: SampleMethod,
    pub timerange: Timerange,
    pub cancel: CancellationToken,
    pub profiler: Option<Arc<Profiler>>,
}

/// Backend describes how to fetch time-series data from a given store.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetches one series; failures come back as `BackendError`.
    async fn fetch_single_series(&self, request: &FetchRequest)
        -> Result<Timeseries, BackendError>;
}

/// MultiBackend fans out a batch of fetch requests and assembles the
/// result list. The first error observed fails the batch.
#[async_trait]
pub trait MultiBackend: Send + Sync {
    async fn fetch_multiple_series(
        &self,
        request: FetchMultipleRequest,
    ) -> RuntimeResult<SeriesList>;
}

/// BackendError always names the metric whose fetch failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub struct BackendError {
    pub metric: TaggedMetric,
    pub kind: BackendErrorKind,
}

impl BackendError {
    pub fn new(metric: TaggedMetric, kind: BackendErrorKind) -> Self {
        BackendError { metric, kind }
    }

    pub fn cancelled(metric: TaggedMetric) -> Self {
        BackendError::new(metric, BackendErrorKind::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Cancelled)
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (metric {})", self.kind, self.metric)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendErrorKind {
    #[error("fetch I/O error: {0}")]
    FetchIo(String),

    #[error("fetch timed out")]
    FetchTimeout,

    #[error("invalid series in backend response: {0}")]
    InvalidSeries(String),

    #[error(transparent)]
    Naming(NamingError),

    #[error("fetch cancelled")]
    Cancelled,
}
