pub use config::load_yaml;
pub use error::{RuleError, RuleResult};
pub use rule::{CompiledRule, RawRule, RuleSet};

mod config;
mod error;
mod rule;
