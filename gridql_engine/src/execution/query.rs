use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use gridql_api::{MetadataProvider, MetricKey, Predicate, SampleMethod, Timerange};

use crate::execution::context::EvaluationContext;
use crate::execution::eval::{evaluate_expressions, Expr};
use crate::execution::fetch_counter::FetchCounter;
use crate::functions::registry::FunctionRegistry;
use crate::profile::Profiler;
use crate::provider::MultiBackend;
use crate::runtime_error::RuntimeResult;
use crate::types::QueryValue;

/// ExecutionContext is the long-lived state commands run against: the
/// handles plus the per-query fetch limit.
pub struct ExecutionContext {
    pub metadata: Arc<dyn MetadataProvider>,
    pub backend: Arc<dyn MultiBackend>,
    /// Maximum number of single fetches one query may issue.
    pub fetch_limit: usize,
    pub registry: Arc<dyn FunctionRegistry>,
    pub profiler: Option<Arc<Profiler>>,
}

/// SelectQuery is the bread and butter of the engine: expressions evaluated
/// over a snapped grid.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub expressions: Vec<Expr>,
    pub predicate: Option<Predicate>,
    pub start: i64,
    pub end: i64,
    pub resolution: i64,
    pub sample_method: SampleMethod,
}

/// Command is the final result of parsing: everything needed to execute one
/// query against the engine.
#[derive(Debug, Clone)]
pub enum Command {
    Select(SelectQuery),
    Describe {
        metric_key: MetricKey,
        predicate: Option<Predicate>,
    },
    DescribeAll,
    DescribeMetrics {
        tag_key: String,
        tag_value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Values(Vec<QueryValue>),
    TagSets(Vec<String>),
    Metrics(Vec<MetricKey>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Select(_) => "select",
            Command::Describe { .. } => "describe",
            Command::DescribeAll => "describe all",
            Command::DescribeMetrics { .. } => "describe metrics",
        }
    }

    pub async fn execute(&self, context: &ExecutionContext) -> RuntimeResult<CommandOutput> {
        let _span = context.profiler.as_ref().map(|p| p.record(self.name()));
        match self {
            Command::Select(query) => execute_select(context, query).await,
            Command::Describe {
                metric_key,
                predicate,
            } => execute_describe(context, metric_key, predicate.as_ref()).await,
            Command::DescribeAll => {
                let mut metrics = context.metadata.get_all_metrics().await?;
                metrics.sort();
                Ok(CommandOutput::Metrics(metrics))
            }
            Command::DescribeMetrics { tag_key, tag_value } => {
                let metrics = context
                    .metadata
                    .get_metrics_for_tag(tag_key, tag_value)
                    .await?;
                Ok(CommandOutput::Metrics(metrics))
            }
        }
    }
}

async fn execute_select(
    context: &ExecutionContext,
    query: &SelectQuery,
) -> RuntimeResult<CommandOutput> {
    let timerange = Timerange::new_snapped(query.start, query.end, query.resolution)?;
    let evaluation = EvaluationContext {
        metadata: Arc::clone(&context.metadata),
        backend: Arc::clone(&context.backend),
        predicate: query.predicate.clone(),
        sample_method: query.sample_method,
        timerange,
        fetch_counter: FetchCounter::new(context.fetch_limit),
        cancel: CancellationToken::new(),
        registry: Arc::clone(&context.registry),
        profiler: context.profiler.clone(),
    };
    let values = evaluate_expressions(&evaluation, &query.expressions).await?;
    Ok(CommandOutput::Values(values))
}

async fn execute_describe(
    context: &ExecutionContext,
    metric_key: &MetricKey,
    predicate: Option<&Predicate>,
) -> RuntimeResult<CommandOutput> {
    let tag_sets = context.metadata.get_all_tags(metric_key).await?;
    let mut output: Vec<String> = tag_sets
        .into_iter()
        .filter(|tag_set| predicate.map_or(true, |p| p.apply(tag_set)))
        .map(|tag_set| tag_set.serialize())
        .collect();
    output.sort();
    Ok(CommandOutput::TagSets(output))
}
