//! Query Module
//!
//! Conjunctive equality filters: `field:value[,field:value...]`.
//!
//! - Values may be wrapped in single or double quotes (commas inside quotes
//!   do not split clauses)
//! - An empty query matches every instance
//! - A clause without `:` fails the whole query
//! - String fields compare verbatim; other fields compare as integers when
//!   both sides parse as one, else by their JSON text

use serde_json::Value;

use crate::error::{AtlasError, Result};
use crate::schema::textual_value;

/// One `field == value` condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub value: String,
}

impl Condition {
    /// Whether `document` satisfies this condition
    pub fn matches(&self, document: &Value) -> bool {
        let Some(actual) = document.get(&self.field) else {
            return false;
        };

        match actual {
            Value::String(s) => *s == self.value,
            other => {
                let text = textual_value(other);
                match (text.parse::<i64>(), self.value.trim().parse::<i64>()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => text == self.value,
                }
            }
        }
    }
}

/// A parsed filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    /// Query matching everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse `field:value,field:"quoted, value"`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::all());
        }

        let conditions = split_clauses(text)?
            .into_iter()
            .map(parse_clause)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// True when every condition holds; stops at the first failure
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
    }
}

// =============================================================================
// Parsing Helpers
// =============================================================================

fn split_clauses(text: &str) -> Result<Vec<&str>> {
    let mut clauses = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, ',') => {
                clauses.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if let Some(q) = quote {
        return Err(AtlasError::InvalidQuery(format!("unterminated {} quote", q)));
    }
    clauses.push(&text[start..]);
    Ok(clauses)
}

fn parse_clause(clause: &str) -> Result<Condition> {
    let clause = clause.trim();
    let (field, value) = clause
        .split_once(':')
        .ok_or_else(|| AtlasError::InvalidQuery(format!("clause '{}' is missing ':'", clause)))?;

    let field = field.trim();
    if field.is_empty() {
        return Err(AtlasError::InvalidQuery(format!("clause '{}' has no field name", clause)));
    }

    Ok(Condition {
        field: field.to_string(),
        value: unquote(value.trim()).to_string(),
    })
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_query_matches_everything() {
        let query = Query::parse("  ").unwrap();
        assert!(query.is_empty());
        assert!(query.matches(&json!({ "anything": 1 })));
    }

    #[test]
    fn quoted_values_keep_commas() {
        let query = Query::parse(r#"name:"Doe, John",city:'Paris'"#).unwrap();
        assert_eq!(query.conditions().len(), 2);
        assert_eq!(query.conditions()[0].value, "Doe, John");
        assert_eq!(query.conditions()[1].value, "Paris");
    }

    #[test]
    fn missing_colon_fails_whole_query() {
        assert!(Query::parse("name:John,age").is_err());
        assert!(Query::parse("name:\"John").is_err());
        assert!(Query::parse(":John").is_err());
    }

    #[test]
    fn string_and_integer_comparison() {
        let doc = json!({ "name": "John", "age": 30, "active": true, "code": "007" });

        assert!(Query::parse("name:John,age:30").unwrap().matches(&doc));
        assert!(Query::parse("age:030").unwrap().matches(&doc));
        assert!(Query::parse("active:true").unwrap().matches(&doc));
        assert!(!Query::parse("code:7").unwrap().matches(&doc));
        assert!(!Query::parse("name:John,age:31").unwrap().matches(&doc));
        assert!(!Query::parse("missing:1").unwrap().matches(&doc));
    }
}
