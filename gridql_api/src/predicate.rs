use regex::Regex;

use crate::tagset::TagSet;

/// Predicate is a boolean filter AST over tag-set lookups. Application is
/// pure and total: an absent key compares as the empty string.
#[derive(Debug, Clone)]
pub enum Predicate {
    True,
    False,
    Equal { key: String, value: String },
    NotEqual { key: String, value: String },
    MatchRegex { key: String, regex: Regex },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equal<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Predicate::Equal {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn not_equal<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Predicate::NotEqual {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn match_regex<K: Into<String>>(key: K, regex: Regex) -> Self {
        Predicate::MatchRegex {
            key: key.into(),
            regex,
        }
    }

    /// AND-merges two optional predicates; either side may be absent.
    pub fn merge(left: Option<Predicate>, right: Option<Predicate>) -> Predicate {
        match (left, right) {
            (None, None) => Predicate::True,
            (Some(p), None) | (None, Some(p)) => p,
            (Some(l), Some(r)) => Predicate::And(vec![l, r]),
        }
    }

    pub fn apply(&self, tag_set: &TagSet) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::Equal { key, value } => tag_set.value_or_empty(key) == value,
            Predicate::NotEqual { key, value } => tag_set.value_or_empty(key) != value,
            Predicate::MatchRegex { key, regex } => regex.is_match(tag_set.value_or_empty(key)),
            Predicate::And(children) => children.iter().all(|p| p.apply(tag_set)),
            Predicate::Or(children) => children.iter().any(|p| p.apply(tag_set)),
            Predicate::Not(child) => !child.apply(tag_set),
        }
    }
}
