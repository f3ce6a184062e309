//! Index Module
//!
//! Secondary indexes over a collection's `indexed` fields.
//!
//! ## Design
//! - One B-tree per indexed field, keyed by the field's textual value
//! - Values point at record offsets in the data file
//! - Purely in memory: rebuilt from a scan when a collection is first
//!   opened, then updated on every append
//! - Offsets of superseded versions stay in the tree; callers filter them
//!   against the collection's live map

mod btree;

pub use btree::{BTree, ORDER};

use std::collections::HashMap;

use serde_json::Value;

use crate::schema::textual_value;

/// Normalize a textual value into an index key.
///
/// Integers are canonicalized so `"030"` and `30` land on the same key;
/// everything else is used as-is.
pub fn index_key(text: &str) -> String {
    match text.trim().parse::<i64>() {
        Ok(n) => n.to_string(),
        Err(_) => text.to_string(),
    }
}

/// The set of B-trees for one collection
#[derive(Debug, Default)]
pub struct FieldIndex {
    trees: HashMap<String, BTree>,
}

impl FieldIndex {
    /// Empty index over the given fields
    pub fn new<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            trees: fields
                .into_iter()
                .map(|name| (name.to_string(), BTree::new()))
                .collect(),
        }
    }

    /// Add a document's indexed fields at `offset`
    pub fn insert_document(&mut self, document: &Value, offset: u64) {
        let Some(object) = document.as_object() else {
            return;
        };
        for (field, tree) in self.trees.iter_mut() {
            if let Some(value) = object.get(field) {
                tree.insert(&index_key(&textual_value(value)), offset);
            }
        }
    }

    /// Candidate offsets for `field == value`.
    ///
    /// Returns `None` when the field is not indexed; an empty vector when it
    /// is and nothing matches.
    pub fn lookup(&self, field: &str, value: &str) -> Option<Vec<u64>> {
        let tree = self.trees.get(field)?;
        Some(
            tree.search_all(&index_key(value))
                .map(|offsets| offsets.to_vec())
                .unwrap_or_default(),
        )
    }

    /// Indexed field names, sorted
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.trees.keys().map(String::as_str).collect();
        fields.sort_unstable();
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_normalizes_integers() {
        let mut index = FieldIndex::new(["age", "name"]);
        index.insert_document(&json!({ "name": "John", "age": 30 }), 64);
        index.insert_document(&json!({ "name": "Jane", "age": "030" }), 200);

        assert_eq!(index.lookup("age", "30"), Some(vec![64, 200]));
        assert_eq!(index.lookup("name", "Jane"), Some(vec![200]));
        assert_eq!(index.lookup("name", "Bob"), Some(vec![]));
        assert_eq!(index.lookup("city", "Paris"), None);
    }
}
