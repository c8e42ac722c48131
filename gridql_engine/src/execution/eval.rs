use futures::future::BoxFuture;

use gridql_api::{MetricKey, Predicate, TaggedMetric};

use crate::execution::context::EvaluationContext;
use crate::provider::FetchMultipleRequest;
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::QueryValue;

/// Expr is the query AST handed to the engine by the parser. Evaluation is
/// single-threaded within one query; only the fetch leaf fans out.
#[derive(Debug, Clone)]
pub enum Expr {
    Scalar(f64),
    /// Milliseconds.
    Duration(i64),
    String(String),
    Fetch {
        metric_name: MetricKey,
        predicate: Option<Predicate>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
        group_by: Vec<String>,
    },
}

impl Expr {
    pub fn fetch(metric_name: impl Into<MetricKey>) -> Self {
        Expr::Fetch {
            metric_name: metric_name.into(),
            predicate: None,
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            function: function.into(),
            args,
            group_by: Vec::new(),
        }
    }

    pub fn evaluate<'a>(
        &'a self,
        context: &'a EvaluationContext,
    ) -> BoxFuture<'a, RuntimeResult<QueryValue>> {
        Box::pin(async move {
            match self {
                Expr::Scalar(value) => Ok(QueryValue::Scalar(*value)),
                Expr::Duration(millis) => Ok(QueryValue::Duration(*millis)),
                Expr::String(value) => Ok(QueryValue::String(value.clone())),
                Expr::Fetch {
                    metric_name,
                    predicate,
                } => evaluate_fetch(context, metric_name, predicate.as_ref()).await,
                Expr::Call {
                    function,
                    args,
                    group_by,
                } => match context.registry.get(function) {
                    Some(function_impl) => function_impl.evaluate(context, args, group_by).await,
                    None => Err(RuntimeError::UnknownFunction(function.clone())),
                },
            }
        })
    }
}

/// Evaluates all expressions in order, propagating the first failure.
pub async fn evaluate_expressions(
    context: &EvaluationContext,
    expressions: &[Expr],
) -> RuntimeResult<Vec<QueryValue>> {
    let mut results = Vec::with_capacity(expressions.len());
    for expression in expressions {
        results.push(expression.evaluate(context).await?);
    }
    Ok(results)
}

async fn evaluate_fetch(
    context: &EvaluationContext,
    metric_name: &MetricKey,
    local_predicate: Option<&Predicate>,
) -> RuntimeResult<QueryValue> {
    let predicate = Predicate::merge(context.predicate.clone(), local_predicate.cloned());

    let tag_sets = {
        let _span = context.profiler.as_ref().map(|p| p.record("get_all_tags"));
        context.metadata.get_all_tags(metric_name).await?
    };

    let metrics: Vec<TaggedMetric> = tag_sets
        .into_iter()
        .filter(|tag_set| predicate.apply(tag_set))
        .map(|tag_set| TaggedMetric::new(metric_name.clone(), tag_set))
        .collect();

    // admission happens before enqueue, for the whole batch at once
    if !context.fetch_counter.consume(metrics.len()) {
        return Err(RuntimeError::FetchLimitExceeded(context.fetch_counter.limit()));
    }

    let list = context
        .backend
        .fetch_multiple_series(FetchMultipleRequest {
            metrics,
            sample_method: context.sample_method,
            timerange: context.timerange,
            cancel: context.cancel.clone(),
            profiler: context.profiler.clone(),
        })
        .await?;

    Ok(QueryValue::SeriesList(list.with_name(metric_name.as_str())))
}
