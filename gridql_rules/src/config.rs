use serde::Deserialize;
use tracing::debug;

use crate::error::{RuleError, RuleResult};
use crate::rule::{RawRule, RuleSet};

/// The rule file shape:
///
/// ```yaml
/// rules:
///   - pattern: "prefix.%foo%"
///     metric_key: "test-metric"
///     regex: {}
/// ```
///
/// The ordering of the `rules` list is significant.
#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<RawRule>,
}

/// Loads and compiles a rule set from YAML file contents.
pub fn load_yaml(contents: &str) -> RuleResult<RuleSet> {
    let file: RuleFile =
        serde_yaml::from_str(contents).map_err(|err| RuleError::InvalidYaml(err.to_string()))?;
    let rule_set = RuleSet::compile(file.rules)?;
    debug!(rules = rule_set.rules().len(), "compiled naming rule set");
    Ok(rule_set)
}
