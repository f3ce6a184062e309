//! Field definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "number", alias = "double")]
    Float,
    #[serde(alias = "boolean")]
    Bool,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "" => Ok(FieldType::String),
            "int" | "integer" => Ok(FieldType::Int),
            "float" | "number" | "double" => Ok(FieldType::Float),
            "bool" | "boolean" => Ok(FieldType::Bool),
            "array" => Ok(FieldType::Array),
            "object" => Ok(FieldType::Object),
            other => Err(AtlasError::InvalidSchema(format!("unknown field type '{}'", other))),
        }
    }
}

/// One field of a collection schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub indexed: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType, required: bool, indexed: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            required,
            indexed,
        }
    }

    /// Parse `name:type:required|optional:indexed|unindexed`.
    ///
    /// Trailing parts may be omitted (optional, unindexed).
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.split(':').map(str::trim);

        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AtlasError::InvalidSchema(format!("missing field name in '{}'", line)))?;
        let field_type = parts.next().unwrap_or("string").parse()?;
        let required = match parts.next().unwrap_or("optional") {
            "required" | "true" => true,
            "optional" | "false" | "" => false,
            other => {
                return Err(AtlasError::InvalidSchema(format!(
                    "field '{}': expected required|optional, got '{}'",
                    name, other
                )))
            }
        };
        let indexed = match parts.next().unwrap_or("unindexed") {
            "indexed" | "true" => true,
            "unindexed" | "false" | "" => false,
            other => {
                return Err(AtlasError::InvalidSchema(format!(
                    "field '{}': expected indexed|unindexed, got '{}'",
                    name, other
                )))
            }
        };

        if parts.next().is_some() {
            return Err(AtlasError::InvalidSchema(format!("too many parts in '{}'", line)));
        }

        Ok(Self::new(name, field_type, required, indexed))
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.name,
            self.field_type,
            if self.required { "required" } else { "optional" },
            if self.indexed { "indexed" } else { "unindexed" }
        )
    }
}
