use ledgerfold_core::{Field, Record, TextField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::OrderedMap;
use crate::util::contains_lowered;

/// Assigns a tag when any `find` pattern occurs in any of the listed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    #[serde(default)]
    pub find: Vec<String>,
    #[serde(default)]
    pub field: Vec<Field>,
}

/// Overwrites a listed field with the rule's replacement value when any
/// `pattern` occurs in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplacementRule {
    #[serde(default)]
    pub pattern: Vec<String>,
    #[serde(default)]
    pub field: Vec<TextField>,
}

/// A rule keyed by its output value, with patterns lowercased once up front.
#[derive(Debug, Clone)]
struct CompiledRule<F> {
    key: String,
    patterns: Vec<String>,
    fields: Vec<F>,
}

impl<F> CompiledRule<F> {
    fn new(key: String, patterns: Vec<String>, fields: Vec<F>) -> Self {
        CompiledRule {
            key,
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
            fields,
        }
    }
}

/// Ordered tag rule set. Iteration order does not change the result, since
/// tags form a set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "OrderedMap<TagRule>")]
pub struct TagRules {
    rules: Vec<CompiledRule<Field>>,
}

impl From<OrderedMap<TagRule>> for TagRules {
    fn from(map: OrderedMap<TagRule>) -> Self {
        TagRules::new(map.into_entries())
    }
}

impl TagRules {
    pub fn new(rules: Vec<(String, TagRule)>) -> Self {
        TagRules {
            rules: rules
                .into_iter()
                .map(|(tag, rule)| CompiledRule::new(tag, rule.find, rule.field))
                .collect(),
        }
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every tag whose rule matches the record. Prior tags on the record are ignored.
    pub fn classify(&self, record: &Record) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|rule| {
                rule.patterns.iter().any(|pattern| {
                    rule.fields
                        .iter()
                        .any(|field| contains_lowered(&record.field(*field), pattern))
                })
            })
            .map(|rule| rule.key.clone())
            .collect()
    }

    /// Replaces the record's tags with a fresh classification.
    pub fn apply(&self, mut record: Record) -> Record {
        record.tags = self.classify(&record);
        record
    }
}

/// Ordered replacement rule set. Order is significant: rules run in
/// declaration order against the current field values, so a later rule sees
/// (and may overwrite) an earlier rule's output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "OrderedMap<ReplacementRule>")]
pub struct ReplacementRules {
    rules: Vec<CompiledRule<TextField>>,
}

impl From<OrderedMap<ReplacementRule>> for ReplacementRules {
    fn from(map: OrderedMap<ReplacementRule>) -> Self {
        ReplacementRules::new(map.into_entries())
    }
}

impl ReplacementRules {
    pub fn new(rules: Vec<(String, ReplacementRule)>) -> Self {
        ReplacementRules {
            rules: rules
                .into_iter()
                .map(|(value, rule)| CompiledRule::new(value, rule.pattern, rule.field))
                .collect(),
        }
    }

    pub fn replacement_values(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, record: Record) -> Record {
        self.rules.iter().fold(record, |mut record, rule| {
            for pattern in &rule.patterns {
                for &field in &rule.fields {
                    if contains_lowered(record.text(field), pattern) {
                        record.set_text(field, rule.key.clone());
                    }
                }
            }
            record
        })
    }
}
