use thiserror::Error;

pub type RuleResult<T> = Result<T, RuleError>;

/// Enum for the rule-compilation errors. All of these are fatal at load
/// time; a rule set either compiles completely or not at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid metric key pattern: {0}")]
    InvalidMetricKey(String),

    #[error("invalid custom regex for tag `{tag}`: {reason}")]
    InvalidCustomRegex { tag: String, reason: String },

    #[error("error parsing rule yaml: {0}")]
    InvalidYaml(String),
}
