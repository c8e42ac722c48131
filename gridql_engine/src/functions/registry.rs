use ahash::AHashMap;
use futures::future::BoxFuture;

use crate::execution::binary::join;
use crate::execution::{evaluate_expressions, EvaluationContext, Expr};
use crate::functions::aggregate::{self, aggregate_by, Reducer};
use crate::functions::transform::{self, apply_transform, map_maker, Transform};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::QueryValue;

/// MetricFunction is one registered query function. The function owns the
/// evaluation of its arguments, which lets higher-order functions stay
/// lazy and inject the context they need.
pub trait MetricFunction: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate<'a>(
        &'a self,
        context: &'a EvaluationContext,
        args: &'a [Expr],
        group_by: &'a [String],
    ) -> BoxFuture<'a, RuntimeResult<QueryValue>>;
}

/// FunctionRegistry resolves call expressions by name.
pub trait FunctionRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<&dyn MetricFunction>;
}

/// StandardRegistry holds the built-in operators, aggregations and
/// transforms; shells may register more.
#[derive(Default)]
pub struct StandardRegistry {
    functions: AHashMap<String, Box<dyn MetricFunction>>,
}

impl StandardRegistry {
    pub fn new() -> Self {
        StandardRegistry::default()
    }

    /// The registry with every built-in function installed.
    pub fn with_builtins() -> Self {
        let mut registry = StandardRegistry::new();

        registry.register(Box::new(OperatorFunction::new("+", |a, b| a + b)));
        registry.register(Box::new(OperatorFunction::new("-", |a, b| a - b)));
        registry.register(Box::new(OperatorFunction::new("*", |a, b| a * b)));
        registry.register(Box::new(OperatorFunction::new("/", |a, b| a / b)));

        registry.register(Box::new(AggregateFunction::new(
            "aggregate.sum",
            aggregate::sum,
        )));
        registry.register(Box::new(AggregateFunction::new(
            "aggregate.mean",
            aggregate::mean,
        )));
        registry.register(Box::new(AggregateFunction::new(
            "aggregate.min",
            aggregate::min,
        )));
        registry.register(Box::new(AggregateFunction::new(
            "aggregate.max",
            aggregate::max,
        )));

        registry.register(TransformFunction::boxed(
            "transform.derivative",
            0,
            transform::derivative,
        ));
        registry.register(TransformFunction::boxed("transform.rate", 0, transform::rate));
        registry.register(TransformFunction::boxed(
            "transform.integral",
            0,
            transform::integral,
        ));
        registry.register(TransformFunction::boxed(
            "transform.cumulative",
            0,
            transform::cumulative,
        ));
        registry.register(TransformFunction::boxed(
            "transform.default",
            1,
            transform::default_value,
        ));
        registry.register(TransformFunction::boxed(
            "transform.nan_keep_last",
            0,
            transform::nan_keep_last,
        ));
        registry.register(TransformFunction::boxed(
            "transform.abs",
            0,
            map_maker(f64::abs),
        ));

        registry
    }

    pub fn register(&mut self, function: Box<dyn MetricFunction>) {
        self.functions
            .insert(function.name().to_string(), function);
    }
}

impl FunctionRegistry for StandardRegistry {
    fn get(&self, name: &str) -> Option<&dyn MetricFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }
}

fn expect_arg_count(function: &str, args: &[Expr], expected: usize) -> RuntimeResult<()> {
    if args.len() != expected {
        return Err(RuntimeError::InvalidArgCount {
            function: function.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

/// Elementwise arithmetic between two series lists, joined on their tag-set
/// intersection. Scalars coerce into constant series first.
struct OperatorFunction {
    name: &'static str,
    op: fn(f64, f64) -> f64,
}

impl OperatorFunction {
    fn new(name: &'static str, op: fn(f64, f64) -> f64) -> Self {
        OperatorFunction { name, op }
    }
}

impl MetricFunction for OperatorFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate<'a>(
        &'a self,
        context: &'a EvaluationContext,
        args: &'a [Expr],
        _group_by: &'a [String],
    ) -> BoxFuture<'a, RuntimeResult<QueryValue>> {
        Box::pin(async move {
            expect_arg_count(self.name, args, 2)?;
            let mut values = evaluate_expressions(context, args).await?.into_iter();
            let left = match values.next() {
                Some(value) => value.into_series_list(&context.timerange)?,
                None => return Err(RuntimeError::from("missing operand")),
            };
            let right = match values.next() {
                Some(value) => value.into_series_list(&context.timerange)?,
                None => return Err(RuntimeError::from("missing operand")),
            };
            let joined = join(&left, &right, self.op)?;
            let named = joined.with_name(format!("({} {} {})", left.name, self.name, right.name));
            Ok(QueryValue::SeriesList(named))
        })
    }
}

/// Groups its series-list argument by the call's `group_by` tags and
/// reduces every group slot-wise.
struct AggregateFunction {
    name: &'static str,
    reducer: Reducer,
}

impl AggregateFunction {
    fn new(name: &'static str, reducer: Reducer) -> Self {
        AggregateFunction { name, reducer }
    }
}

impl MetricFunction for AggregateFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate<'a>(
        &'a self,
        context: &'a EvaluationContext,
        args: &'a [Expr],
        group_by: &'a [String],
    ) -> BoxFuture<'a, RuntimeResult<QueryValue>> {
        Box::pin(async move {
            expect_arg_count(self.name, args, 1)?;
            let value = args[0].evaluate(context).await?;
            let list = value.into_series_list(&context.timerange)?;
            let aggregated = aggregate_by(&list, self.reducer, group_by);
            let named = aggregated.with_name(format!("{}({})", self.name, list.name));
            Ok(QueryValue::SeriesList(named))
        })
    }
}

/// Applies a pointwise transform to its series-list argument; the
/// remaining arguments become the transform parameters.
struct TransformFunction {
    name: &'static str,
    parameter_count: usize,
    transform: Box<dyn Transform>,
}

impl TransformFunction {
    fn boxed(
        name: &'static str,
        parameter_count: usize,
        transform: impl Transform + 'static,
    ) -> Box<Self> {
        Box::new(TransformFunction {
            name,
            parameter_count,
            transform: Box::new(transform),
        })
    }
}

impl MetricFunction for TransformFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate<'a>(
        &'a self,
        context: &'a EvaluationContext,
        args: &'a [Expr],
        _group_by: &'a [String],
    ) -> BoxFuture<'a, RuntimeResult<QueryValue>> {
        Box::pin(async move {
            expect_arg_count(self.name, args, 1 + self.parameter_count)?;
            let value = args[0].evaluate(context).await?;
            let list = value.into_series_list(&context.timerange)?;
            let parameters = evaluate_expressions(context, &args[1..]).await?;
            let transformed = apply_transform(&list, self.transform.as_ref(), &parameters)?;
            let named = transformed.with_name(format!("{}({})", self.name, list.name));
            Ok(QueryValue::SeriesList(named))
        })
    }
}
