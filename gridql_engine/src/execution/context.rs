use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use gridql_api::{MetadataProvider, Predicate, SampleMethod, Timerange};

use crate::execution::fetch_counter::FetchCounter;
use crate::functions::registry::FunctionRegistry;
use crate::profile::Profiler;
use crate::provider::MultiBackend;

/// EvaluationContext carries everything one query evaluation needs. The
/// handles are read-only for the duration of the query; the fetch counter
/// and cancellation token are its only shared mutable state.
pub struct EvaluationContext {
    pub metadata: Arc<dyn MetadataProvider>,
    pub backend: Arc<dyn MultiBackend>,
    pub predicate: Option<Predicate>,
    pub sample_method: SampleMethod,
    /// Already snapped by the command layer.
    pub timerange: Timerange,
    pub fetch_counter: FetchCounter,
    pub cancel: CancellationToken,
    pub registry: Arc<dyn FunctionRegistry>,
    pub profiler: Option<Arc<Profiler>>,
}
