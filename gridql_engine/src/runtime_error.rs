use thiserror::Error;

use gridql_api::{ApiError, NamingError};

use crate::provider::BackendError;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced while evaluating a query. All of these are fatal to the
/// query that produced them; evaluation is fail-fast.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Argument error: {0}")]
    ArgumentError(String),

    #[error("{function}: expected {expected} args, got {actual}")]
    InvalidArgCount {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown function `{0}`")]
    UnknownFunction(String),

    #[error("Type error: {0}")]
    TypeCastError(String),

    #[error("fetch limit exceeded: too many series to fetch (limit {0})")]
    FetchLimitExceeded(usize),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{0}")]
    General(String),
}

impl From<&str> for RuntimeError {
    fn from(message: &str) -> Self {
        RuntimeError::General(String::from(message))
    }
}

impl From<String> for RuntimeError {
    fn from(message: String) -> Self {
        RuntimeError::General(message)
    }
}
