use async_trait::async_trait;

use crate::error::{ApiResult, NamingError};
use crate::tagset::{GraphiteName, MetricKey, TagSet, TaggedMetric};

/// MetadataProvider is the tag-index seam: it enumerates the tagged series
/// known for a metric key. The physical schema behind it is not our
/// concern; implementations are expected to do I/O.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// All tag sets stored for the given metric key.
    async fn get_all_tags(&self, metric_key: &MetricKey) -> ApiResult<Vec<TagSet>>;

    /// All metric keys known to the index.
    async fn get_all_metrics(&self) -> ApiResult<Vec<MetricKey>>;

    /// All metric keys carrying the given tag key/value pair.
    async fn get_metrics_for_tag(&self, tag_key: &str, tag_value: &str)
        -> ApiResult<Vec<MetricKey>>;
}

/// MetricNamer is the bidirectional naming seam between the backend's
/// dotted identifiers and `(metric_key, tag_set)` pairs. The rule engine is
/// the production implementation.
pub trait MetricNamer: Send + Sync {
    /// Renders a tagged metric into the graphite name the backend stores it
    /// under.
    fn to_graphite_name(&self, metric: &TaggedMetric) -> Result<GraphiteName, NamingError>;

    /// Resolves a graphite name into a tagged metric, or `None` when no
    /// rule matches.
    fn to_tagged_metric(&self, name: &GraphiteName) -> Option<TaggedMetric>;
}
