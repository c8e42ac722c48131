pub use query_value::QueryValue;

mod query_value;
