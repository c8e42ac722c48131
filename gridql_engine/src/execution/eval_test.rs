use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gridql_api::{
    ApiResult, MetadataProvider, MetricKey, Predicate, SampleMethod, TagSet, Timerange, Timeseries,
};

use crate::execution::context::EvaluationContext;
use crate::execution::eval::{evaluate_expressions, Expr};
use crate::execution::fetch_counter::FetchCounter;
use crate::execution::query::{Command, CommandOutput, ExecutionContext, SelectQuery};
use crate::functions::StandardRegistry;
use crate::provider::{
    Backend, BackendError, BackendErrorKind, FetchRequest, ParallelMultiFetch,
};
use crate::runtime_error::RuntimeError;
use crate::types::QueryValue;

/// In-memory tag index.
struct FakeMetadata {
    tags: HashMap<MetricKey, Vec<TagSet>>,
}

impl FakeMetadata {
    fn new(entries: &[(&str, &[&str])]) -> Self {
        FakeMetadata {
            tags: entries
                .iter()
                .map(|(key, tag_sets)| {
                    (
                        MetricKey::from(*key),
                        tag_sets.iter().map(|t| TagSet::parse(t)).collect(),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn get_all_tags(&self, metric_key: &MetricKey) -> ApiResult<Vec<TagSet>> {
        Ok(self.tags.get(metric_key).cloned().unwrap_or_default())
    }

    async fn get_all_metrics(&self) -> ApiResult<Vec<MetricKey>> {
        Ok(self.tags.keys().cloned().collect())
    }

    async fn get_metrics_for_tag(&self, tag_key: &str, tag_value: &str) -> ApiResult<Vec<MetricKey>> {
        Ok(self
            .tags
            .iter()
            .filter(|(_, tag_sets)| {
                tag_sets
                    .iter()
                    .any(|ts| ts.value_or_empty(tag_key) == tag_value)
            })
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Serves values keyed by `metric_key|tag_set`.
struct FakeBackend {
    data: HashMap<String, Vec<f64>>,
}

impl FakeBackend {
    fn new(entries: &[(&str, &str, &[f64])]) -> Self {
        FakeBackend {
            data: entries
                .iter()
                .map(|(key, tags, values)| {
                    (
                        format!("{key}|{}", TagSet::parse(tags).serialize()),
                        values.to_vec(),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_single_series(
        &self,
        request: &FetchRequest,
    ) -> Result<Timeseries, BackendError> {
        let key = format!(
            "{}|{}",
            request.metric.metric_key,
            request.metric.tag_set.serialize()
        );
        match self.data.get(&key) {
            Some(values) => Ok(Timeseries::new(
                values.clone(),
                request.metric.tag_set.clone(),
            )),
            None => Err(BackendError::new(
                request.metric.clone(),
                BackendErrorKind::InvalidSeries(format!("no such series {key}")),
            )),
        }
    }
}

fn test_timerange() -> Timerange {
    Timerange::new(0, 60_000, 30_000).unwrap()
}

fn context_over(metadata: FakeMetadata, backend: FakeBackend, fetch_limit: usize) -> EvaluationContext {
    EvaluationContext {
        metadata: Arc::new(metadata),
        backend: Arc::new(ParallelMultiFetch::new(Arc::new(backend), 4)),
        predicate: None,
        sample_method: SampleMethod::Mean,
        timerange: test_timerange(),
        fetch_counter: FetchCounter::new(fetch_limit),
        cancel: CancellationToken::new(),
        registry: Arc::new(StandardRegistry::with_builtins()),
        profiler: None,
    }
}

fn cpu_fixture() -> (FakeMetadata, FakeBackend) {
    let metadata = FakeMetadata::new(&[(
        "cpu.user",
        &["env=production,host=a", "env=production,host=b", "env=staging,host=c"],
    )]);
    let backend = FakeBackend::new(&[
        ("cpu.user", "env=production,host=a", &[1.0, 2.0, 3.0]),
        ("cpu.user", "env=production,host=b", &[10.0, 20.0, 30.0]),
        ("cpu.user", "env=staging,host=c", &[100.0, 200.0, 300.0]),
    ]);
    (metadata, backend)
}

#[tokio::test]
async fn test_scalar_expression_coerces_to_constant_series() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let value = Expr::Scalar(5.0).evaluate(&context).await.unwrap();
    let list = value.into_series_list(&context.timerange).unwrap();
    assert_eq!(list.series.len(), 1);
    assert_eq!(list.series[0].values, vec![5.0, 5.0, 5.0]);
    assert!(list.series[0].tag_set.is_empty());
}

#[tokio::test]
async fn test_fetch_expression_lists_filters_and_names() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let value = Expr::fetch("cpu.user").evaluate(&context).await.unwrap();
    let QueryValue::SeriesList(list) = value else {
        panic!("expected a series list");
    };
    assert_eq!(list.name, "cpu.user");
    assert_eq!(list.series.len(), 3);
    assert_eq!(context.fetch_counter.current(), 3);
}

#[tokio::test]
async fn test_fetch_merges_context_and_local_predicates() {
    let (metadata, backend) = cpu_fixture();
    let mut context = context_over(metadata, backend, 1000);
    context.predicate = Some(Predicate::equal("env", "production"));

    let expr = Expr::Fetch {
        metric_name: MetricKey::from("cpu.user"),
        predicate: Some(Predicate::equal("host", "b")),
    };
    let value = expr.evaluate(&context).await.unwrap();
    let QueryValue::SeriesList(list) = value else {
        panic!("expected a series list");
    };
    assert_eq!(list.series.len(), 1);
    assert_eq!(list.series[0].values, vec![10.0, 20.0, 30.0]);
    assert_eq!(context.fetch_counter.current(), 1);
}

#[tokio::test]
async fn test_fetch_limit_exceeded() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 2);

    let err = Expr::fetch("cpu.user").evaluate(&context).await.unwrap_err();
    assert_eq!(err, RuntimeError::FetchLimitExceeded(2));
    // nothing was admitted
    assert_eq!(context.fetch_counter.current(), 0);
}

#[tokio::test]
async fn test_unknown_function() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let expr = Expr::call("transform.nope", vec![Expr::fetch("cpu.user")]);
    let err = expr.evaluate(&context).await.unwrap_err();
    assert_eq!(err, RuntimeError::UnknownFunction("transform.nope".to_string()));
}

#[tokio::test]
async fn test_arity_error() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let expr = Expr::call("aggregate.sum", vec![]);
    let err = expr.evaluate(&context).await.unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidArgCount { .. }));
}

#[tokio::test]
async fn test_aggregate_over_fetch() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let expr = Expr::Call {
        function: "aggregate.sum".to_string(),
        args: vec![Expr::fetch("cpu.user")],
        group_by: vec!["env".to_string()],
    };
    let value = expr.evaluate(&context).await.unwrap();
    let QueryValue::SeriesList(list) = value else {
        panic!("expected a series list");
    };
    assert_eq!(list.series.len(), 2);
    for (tags, values) in [
        ("env=production", vec![11.0, 22.0, 33.0]),
        ("env=staging", vec![100.0, 200.0, 300.0]),
    ] {
        assert!(list
            .series
            .iter()
            .any(|s| s.tag_set.serialize() == tags && s.values == values));
    }
}

#[tokio::test]
async fn test_operator_joins_fetch_with_scalar() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let expr = Expr::call("+", vec![Expr::fetch("cpu.user"), Expr::Scalar(1.0)]);
    let value = expr.evaluate(&context).await.unwrap();
    let QueryValue::SeriesList(list) = value else {
        panic!("expected a series list");
    };
    // the scalar's empty tag set joins with every series
    assert_eq!(list.series.len(), 3);
    assert!(list
        .series
        .iter()
        .any(|s| s.values == vec![2.0, 3.0, 4.0]));
}

#[tokio::test]
async fn test_transform_over_fetch() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let expr = Expr::call("transform.cumulative", vec![Expr::fetch("cpu.user")]);
    let value = expr.evaluate(&context).await.unwrap();
    let QueryValue::SeriesList(list) = value else {
        panic!("expected a series list");
    };
    assert!(list
        .series
        .iter()
        .any(|s| s.values == vec![1.0, 3.0, 6.0]));
}

#[tokio::test]
async fn test_evaluate_expressions_is_fail_fast() {
    let (metadata, backend) = cpu_fixture();
    let context = context_over(metadata, backend, 1000);

    let exprs = [
        Expr::Scalar(1.0),
        Expr::call("no.such.function", vec![]),
        Expr::Scalar(2.0),
    ];
    let err = evaluate_expressions(&context, &exprs).await.unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownFunction(_)));
}

#[tokio::test]
async fn test_backend_error_fails_the_fetch() {
    let metadata = FakeMetadata::new(&[("cpu.user", &["host=a", "host=missing"])]);
    let backend = FakeBackend::new(&[("cpu.user", "host=a", &[1.0, 2.0, 3.0])]);
    let context = context_over(metadata, backend, 1000);

    let err = Expr::fetch("cpu.user").evaluate(&context).await.unwrap_err();
    match err {
        RuntimeError::Backend(err) => {
            assert_eq!(err.metric.tag_set.serialize(), "host=missing");
            assert!(matches!(err.kind, BackendErrorKind::InvalidSeries(_)));
        }
        other => panic!("expected a backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_select_command_snaps_and_evaluates() {
    let (metadata, backend) = cpu_fixture();
    let execution = ExecutionContext {
        metadata: Arc::new(metadata),
        backend: Arc::new(ParallelMultiFetch::new(Arc::new(backend), 4)),
        fetch_limit: 1000,
        registry: Arc::new(StandardRegistry::with_builtins()),
        profiler: Some(Arc::new(crate::profile::Profiler::new())),
    };

    let command = Command::Select(SelectQuery {
        expressions: vec![Expr::fetch("cpu.user")],
        predicate: Some(Predicate::equal("env", "staging")),
        // unaligned on purpose: snapped to [0, 60000]
        start: 13,
        end: 59_000,
        resolution: 30_000,
        sample_method: SampleMethod::Mean,
    });
    let output = command.execute(&execution).await.unwrap();
    let CommandOutput::Values(values) = output else {
        panic!("expected values");
    };
    assert_eq!(values.len(), 1);
    let QueryValue::SeriesList(list) = &values[0] else {
        panic!("expected a series list");
    };
    assert_eq!(list.timerange.start(), 0);
    assert_eq!(list.timerange.end(), 60_000);
    assert_eq!(list.series.len(), 1);
    assert_eq!(list.series[0].values, vec![100.0, 200.0, 300.0]);

    let profiles = execution.profiler.as_ref().unwrap().all();
    assert!(profiles.iter().any(|p| p.name() == "select"));
}

#[tokio::test]
async fn test_describe_commands() {
    let (metadata, backend) = cpu_fixture();
    let execution = ExecutionContext {
        metadata: Arc::new(metadata),
        backend: Arc::new(ParallelMultiFetch::new(Arc::new(backend), 4)),
        fetch_limit: 1000,
        registry: Arc::new(StandardRegistry::with_builtins()),
        profiler: None,
    };

    let output = Command::Describe {
        metric_key: MetricKey::from("cpu.user"),
        predicate: Some(Predicate::equal("env", "production")),
    }
    .execute(&execution)
    .await
    .unwrap();
    assert_eq!(
        output,
        CommandOutput::TagSets(vec![
            "env=production,host=a".to_string(),
            "env=production,host=b".to_string(),
        ])
    );

    let output = Command::DescribeAll.execute(&execution).await.unwrap();
    assert_eq!(
        output,
        CommandOutput::Metrics(vec![MetricKey::from("cpu.user")])
    );

    let output = Command::DescribeMetrics {
        tag_key: "env".to_string(),
        tag_value: "staging".to_string(),
    }
    .execute(&execution)
    .await
    .unwrap();
    assert_eq!(
        output,
        CommandOutput::Metrics(vec![MetricKey::from("cpu.user")])
    );
}
