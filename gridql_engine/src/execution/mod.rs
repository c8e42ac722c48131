pub use context::EvaluationContext;
pub use eval::{evaluate_expressions, Expr};
pub use fetch_counter::FetchCounter;
pub use query::{Command, CommandOutput, ExecutionContext, SelectQuery};

pub mod binary;
mod context;
mod eval;
mod fetch_counter;
mod query;

#[cfg(test)]
mod eval_test;
