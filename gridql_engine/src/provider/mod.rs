pub use backend::{
    Backend, BackendError, BackendErrorKind, FetchMultipleRequest, FetchRequest, MultiBackend,
};
pub use blueflood::{
    choose_resolution, select_field, Blueflood, BluefloodConfig, MetricPoint, QueryResponse,
    Resolution, ResolutionTtls,
};
pub use deadline::Deadline;
pub use multi_fetch::{ParallelMultiFetch, SequentialMultiFetch, DEFAULT_PARALLELISM};

mod backend;
mod blueflood;
mod deadline;
mod multi_fetch;

#[cfg(test)]
mod multi_fetch_test;
