//! Schema Module
//!
//! Field schemas for collections and document validation against them.
//!
//! ## Schema File Format
//! One field per line:
//! ```text
//! name:string:required:indexed
//! age:int:optional:unindexed
//! ```
//!
//! A collection without a schema file accepts any JSON object.

mod field;
mod validate;

pub use field::{FieldSchema, FieldType};
pub use validate::{textual_value, validate_instance};

use serde_json::Value;

use crate::error::{AtlasError, Result};
use crate::storage::format::checksum;
use crate::storage::validate_field_name;

/// Ordered list of field definitions for one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

impl Schema {
    /// Build a schema, rejecting bad or duplicate field names
    pub fn new(fields: Vec<FieldSchema>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            validate_field_name(&field.name)
                .map_err(|e| AtlasError::InvalidSchema(e.to_string()))?;
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(AtlasError::InvalidSchema(format!(
                    "field '{}' defined twice",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Parse `schema.txt` contents
    pub fn parse(text: &str) -> Result<Self> {
        let fields = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(FieldSchema::parse_line)
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    /// Parse the `schema` array of a create-collection request body
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Array(_) => {
                let fields: Vec<FieldSchema> = serde_json::from_value(value.clone())
                    .map_err(|e| AtlasError::InvalidSchema(e.to_string()))?;
                Self::new(fields)
            }
            other => Err(AtlasError::InvalidSchema(format!(
                "schema must be an array of fields, got {}",
                other
            ))),
        }
    }

    /// Serialize to `schema.txt` contents (one line per field)
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for field in &self.fields {
            text.push_str(&field.to_line());
            text.push('\n');
        }
        text
    }

    /// CRC-32 of the serialized schema, stored in the data file header
    pub fn checksum(&self) -> u32 {
        if self.fields.is_empty() {
            0
        } else {
            checksum(self.to_text().as_bytes())
        }
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of fields flagged `indexed`
    pub fn indexed_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.indexed).map(|f| f.name.as_str())
    }

    /// Validate a document against this schema
    pub fn validate(&self, instance: &Value) -> Result<()> {
        validate_instance(instance, &self.fields)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.fields).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}
