use thiserror::Error;

use crate::tagset::TaggedMetric;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors produced by the core model and the metadata seam.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid timerange: {0}")]
    InvalidTimerange(String),

    #[error("metadata backend error: {0}")]
    Metadata(String),
}

/// Errors produced when rendering a tagged metric back into a graphite
/// name. Both variants carry the originating metric.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("cannot convert {metric} to a graphite name: tag `{tag}` is missing")]
    MissingTag { metric: TaggedMetric, tag: String },

    #[error("no naming rule can interpolate {metric}")]
    CannotInterpolate { metric: TaggedMetric },
}

impl NamingError {
    pub fn metric(&self) -> &TaggedMetric {
        match self {
            NamingError::MissingTag { metric, .. } => metric,
            NamingError::CannotInterpolate { metric } => metric,
        }
    }
}
