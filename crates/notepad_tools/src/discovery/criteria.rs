//! Search criteria
//!
//! `key=value` arguments; a bare argument is `name=<value>`. Numeric values
//! match exactly, anything else is a glob pattern.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;
use wildmatch::WildMatch;

/// One search term
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Number(f64),
    Pattern(String),
}

impl Criterion {
    fn parse(value: &str) -> Self {
        match value.parse::<f64>() {
            Ok(number) => Criterion::Number(number),
            Err(_) => Criterion::Pattern(value.to_string()),
        }
    }

    /// Check an inventory field against this criterion
    pub fn matches(&self, field: &Value) -> bool {
        match self {
            Criterion::Number(expected) => match field {
                Value::Number(n) => n.as_f64() == Some(*expected),
                Value::String(s) => s.parse::<f64>().ok() == Some(*expected),
                _ => false,
            },
            Criterion::Pattern(pattern) => {
                let text = match field {
                    Value::String(s) => s.clone(),
                    Value::Null => return false,
                    other => other.to_string(),
                };
                WildMatch::new(pattern).matches(&text)
            }
        }
    }
}

/// Search criteria keyed by inventory field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria(BTreeMap<String, Criterion>);

impl Criteria {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Criterion> {
        self.0.get(key)
    }

    /// True if every criterion matches the corresponding field
    pub fn matches(&self, fields: &serde_json::Map<String, Value>) -> bool {
        self.0.iter().all(|(key, criterion)| {
            fields
                .get(key)
                .is_some_and(|field| criterion.matches(field))
        })
    }
}

/// Parse command line search terms. Repeated keys keep the first value.
pub fn parse_criteria<S: AsRef<str>>(args: &[S]) -> Criteria {
    let mut criteria = BTreeMap::new();

    for arg in args {
        let arg = arg.as_ref();
        let (key, value) = arg.split_once('=').unwrap_or(("name", arg));

        if let Some(previous) = criteria.get(key) {
            warn!(
                "Received duplicate search criteria {}={:?} (was {:?})",
                key, value, previous
            );
            continue;
        }
        criteria.insert(key.to_string(), Criterion::parse(value));
    }

    Criteria(criteria)
}
