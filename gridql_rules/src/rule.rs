use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use gridql_api::{GraphiteName, MetricKey, MetricNamer, NamingError, TagSet, TaggedMetric};

use crate::error::{RuleError, RuleResult};

/// The default capture for a `%tag%` placeholder: a maximal non-empty run
/// that stays inside one graphite segment.
const DEFAULT_TAG_REGEX: &str = "[^.]+";

/// RawRule is one rule exactly as it appears in the rule file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRule {
    /// Graphite-side template: literals and `%tag%` placeholders.
    pub pattern: String,

    /// Metric-key template. May itself carry `%tag%` placeholders, which
    /// are interpolated from the graphite captures.
    #[serde(rename = "metric_key")]
    pub metric_key_pattern: String,

    /// Per-tag regex overrides. Must not contain capturing groups.
    #[serde(default)]
    pub regex: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateToken {
    Literal(String),
    Tag(String),
}

/// A template is a tokenized pattern: literal runs interleaved with tag
/// placeholders, plus the anchored regex synthesized from them. Immutable
/// once built and safe to share across queries.
#[derive(Debug, Clone)]
struct Template {
    tokens: Vec<TemplateToken>,
    tags: Vec<String>,
    regex: Regex,
}

impl Template {
    fn interpolate(&self, values: &HashMap<String, String>) -> Option<String> {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                TemplateToken::Literal(lit) => out.push_str(lit),
                TemplateToken::Tag(tag) => out.push_str(values.get(tag)?),
            }
        }
        Some(out)
    }

    /// Runs the anchored regex and, on a match, extracts every tag capture.
    fn captures(&self, input: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(input)?;
        let mut values = HashMap::with_capacity(self.tags.len());
        for tag in &self.tags {
            values.insert(tag.clone(), caps.name(tag)?.as_str().to_string());
        }
        Some(values)
    }
}

/// CompiledRule is one immutable, validated naming rule.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    raw: RawRule,
    graphite: Template,
    metric_key: Template,
}

impl CompiledRule {
    /// Compiles and validates a raw rule. See `RuleError` for the failure
    /// modes; compilation is the only place rules can fail.
    pub fn compile(raw: RawRule) -> RuleResult<CompiledRule> {
        let graphite_tokens = tokenize(&raw.pattern)
            .map_err(|reason| RuleError::InvalidPattern(format!("`{}`: {reason}", raw.pattern)))?;

        if raw.metric_key_pattern.is_empty() {
            return Err(RuleError::InvalidMetricKey(
                "metric key pattern is empty".to_string(),
            ));
        }
        let key_tokens = tokenize(&raw.metric_key_pattern).map_err(|reason| {
            RuleError::InvalidMetricKey(format!("`{}`: {reason}", raw.metric_key_pattern))
        })?;

        let graphite_tags = template_tags(&graphite_tokens);
        let key_tags = template_tags(&key_tokens);
        for tag in &key_tags {
            if !graphite_tags.contains(tag) {
                return Err(RuleError::InvalidMetricKey(format!(
                    "tag `{tag}` does not appear in pattern `{}`",
                    raw.pattern
                )));
            }
        }

        for (tag, custom) in &raw.regex {
            validate_custom_regex(tag, custom)?;
        }

        let graphite = build_template(graphite_tokens, graphite_tags, &raw.regex)?;
        let metric_key = build_template(key_tokens, key_tags, &raw.regex)?;

        Ok(CompiledRule {
            raw,
            graphite,
            metric_key,
        })
    }

    pub fn raw(&self) -> &RawRule {
        &self.raw
    }

    /// Tags embedded in the graphite pattern, in textual order.
    pub fn graphite_pattern_tags(&self) -> &[String] {
        &self.graphite.tags
    }

    /// Forward match: graphite name in, tagged metric out. Tags consumed by
    /// the metric-key template are interpolated into the key and do not
    /// reappear in the tag set.
    pub fn match_rule(&self, name: &GraphiteName) -> Option<TaggedMetric> {
        let values = self.graphite.captures(name.as_str())?;
        let metric_key = self.metric_key.interpolate(&values)?;

        let mut tag_set = TagSet::new();
        for tag in &self.graphite.tags {
            if !self.metric_key.tags.contains(tag) {
                tag_set.set(tag.clone(), values.get(tag)?.clone());
            }
        }
        Some(TaggedMetric::new(MetricKey::new(metric_key), tag_set))
    }

    /// Inverse render: tagged metric in, graphite name out. The metric key
    /// is matched against the key template first; any remaining tags come
    /// from the tag set.
    pub fn to_graphite_name(&self, metric: &TaggedMetric) -> Result<GraphiteName, NamingError> {
        let mut values = self
            .metric_key
            .captures(metric.metric_key.as_str())
            .ok_or_else(|| NamingError::CannotInterpolate {
                metric: metric.clone(),
            })?;

        for tag in &self.graphite.tags {
            if values.contains_key(tag) {
                continue;
            }
            match metric.tag_set.get(tag.as_str()) {
                Some(value) => {
                    values.insert(tag.clone(), value.to_string());
                }
                None => {
                    return Err(NamingError::MissingTag {
                        metric: metric.clone(),
                        tag: tag.clone(),
                    })
                }
            }
        }

        match self.graphite.interpolate(&values) {
            Some(name) => Ok(GraphiteName::new(name)),
            None => Err(NamingError::CannotInterpolate {
                metric: metric.clone(),
            }),
        }
    }
}

/// RuleSet is an ordered list of compiled rules. Order is significant: the
/// first rule whose regex matches wins, in both directions.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(raw_rules: Vec<RawRule>) -> RuleResult<RuleSet> {
        let mut rules = Vec::with_capacity(raw_rules.len());
        for raw in raw_rules {
            rules.push(CompiledRule::compile(raw)?);
        }
        Ok(RuleSet { rules })
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Forward match across the whole set, first match wins.
    pub fn match_rule(&self, name: &GraphiteName) -> Option<TaggedMetric> {
        self.rules.iter().find_map(|rule| rule.match_rule(name))
    }

    /// Inverse render across the whole set. Rules whose key template does
    /// not match the metric key are skipped; a key-matching rule that lacks
    /// a tag surfaces `MissingTag`.
    pub fn to_graphite_name(&self, metric: &TaggedMetric) -> Result<GraphiteName, NamingError> {
        let mut missing: Option<NamingError> = None;
        for rule in &self.rules {
            match rule.to_graphite_name(metric) {
                Ok(name) => return Ok(name),
                Err(NamingError::CannotInterpolate { .. }) => continue,
                Err(err @ NamingError::MissingTag { .. }) => {
                    missing.get_or_insert(err);
                }
            }
        }
        Err(missing.unwrap_or_else(|| NamingError::CannotInterpolate {
            metric: metric.clone(),
        }))
    }
}

impl MetricNamer for RuleSet {
    fn to_graphite_name(&self, metric: &TaggedMetric) -> Result<GraphiteName, NamingError> {
        RuleSet::to_graphite_name(self, metric)
    }

    fn to_tagged_metric(&self, name: &GraphiteName) -> Option<TaggedMetric> {
        self.match_rule(name)
    }
}

/// Splits a pattern into literal and `%tag%` runs. Error strings here are
/// wrapped into the crate error by the caller, which knows whether the
/// template was the pattern or the metric key.
fn tokenize(pattern: &str) -> Result<Vec<TemplateToken>, String> {
    if pattern.is_empty() {
        return Err("pattern is empty".to_string());
    }

    let mut tokens: Vec<TemplateToken> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut s = pattern;

    while !s.is_empty() {
        match s.find('%') {
            None => {
                tokens.push(TemplateToken::Literal(s.to_string()));
                break;
            }
            Some(0) => {
                let rest = &s[1..];
                let close = rest.find('%').ok_or("unclosed `%`")?;
                let tag = &rest[..close];
                if tag.is_empty() {
                    return Err("`%%` placeholder with no tag name".to_string());
                }
                if !is_valid_tag_name(tag) {
                    return Err(format!("invalid tag name `{tag}`"));
                }
                if seen.contains(&tag) {
                    return Err(format!("tag `{tag}` appears more than once"));
                }
                if matches!(tokens.last(), Some(TemplateToken::Tag(_))) {
                    return Err(format!("placeholder `%{tag}%` follows another placeholder with no separator"));
                }
                seen.push(tag);
                tokens.push(TemplateToken::Tag(tag.to_string()));
                s = &rest[close + 1..];
            }
            Some(n) => {
                tokens.push(TemplateToken::Literal(s[..n].to_string()));
                s = &s[n..];
            }
        }
    }

    Ok(tokens)
}

fn template_tags(tokens: &[TemplateToken]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|t| match t {
            TemplateToken::Tag(tag) => Some(tag.clone()),
            TemplateToken::Literal(_) => None,
        })
        .collect()
}

fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A custom regex is concatenated into the synthesized master regex, so it
/// must compile on its own and must not shift capture indices.
fn validate_custom_regex(tag: &str, custom: &str) -> RuleResult<()> {
    let compiled = Regex::new(custom).map_err(|err| RuleError::InvalidCustomRegex {
        tag: tag.to_string(),
        reason: err.to_string(),
    })?;
    // captures_len() counts the implicit whole-match group.
    if compiled.captures_len() > 1 {
        return Err(RuleError::InvalidCustomRegex {
            tag: tag.to_string(),
            reason: "custom regex must not contain capturing groups".to_string(),
        });
    }
    Ok(())
}

fn build_template(
    tokens: Vec<TemplateToken>,
    tags: Vec<String>,
    overrides: &HashMap<String, String>,
) -> RuleResult<Template> {
    let mut source = String::from("^");
    for token in &tokens {
        match token {
            TemplateToken::Literal(lit) => source.push_str(&regex::escape(lit)),
            TemplateToken::Tag(tag) => {
                let tag_regex = overrides
                    .get(tag)
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_TAG_REGEX);
                source.push_str(&format!("(?P<{tag}>{tag_regex})"));
            }
        }
    }
    source.push('$');

    let regex = Regex::new(&source).map_err(|err| {
        // custom regexes were validated standalone, so this indicates a bad
        // tag name slipping through tokenization
        RuleError::InvalidPattern(format!("cannot synthesize matcher: {err}"))
    })?;

    Ok(Template {
        tokens,
        tags,
        regex,
    })
}
