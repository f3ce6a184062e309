//! Identifier validation
//!
//! Database, collection and field names become directory names (or schema
//! tokens), so they are restricted to a conservative whitelist.

use crate::error::{AtlasError, Result};

/// Longest accepted identifier (bytes)
pub const MAX_NAME_LEN: usize = 256;

/// Validate a database or collection name.
///
/// Accepts ASCII letters, digits, `_`, `-` and `.`. Rejects empty names,
/// `.`/`..` and any name containing `..`, path separators, whitespace or
/// shell metacharacters.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AtlasError::InvalidName(format!("{} name is empty", kind)));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(AtlasError::InvalidName(format!(
            "{} name is {} bytes (max {})",
            kind,
            name.len(),
            MAX_NAME_LEN
        )));
    }

    if name == "." || name.contains("..") {
        return Err(AtlasError::InvalidName(format!(
            "{} name '{}' is a path traversal",
            kind, name
        )));
    }

    if let Some(bad) = name.chars().find(|c| !is_name_char(*c)) {
        return Err(AtlasError::InvalidName(format!(
            "{} name '{}' contains illegal character {:?}",
            kind, name, bad
        )));
    }

    Ok(())
}

/// Validate a schema field name.
///
/// Field names are written into `schema.txt` as `name:type:...`, so `:` is
/// excluded along with everything `validate_name` excludes.
pub fn validate_field_name(name: &str) -> Result<()> {
    validate_name("field", name)?;
    if matches!(name, "_id" | "_created_at" | "_updated_at") {
        return Err(AtlasError::InvalidName(format!(
            "field name '{}' is reserved",
            name
        )));
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_name() {
        assert!(validate_name("database", "My-DB_1.2").is_ok());
    }

    #[test]
    fn rejects_traversal_and_metacharacters() {
        for bad in ["../etc", "..", ".", "a/b", "a\\b", "my db", "db;rm", "$(x)", "a|b", ""] {
            assert!(validate_name("database", bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn rejects_overlong_name() {
        let name = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_name("collection", &name).is_err());
        assert!(validate_name("collection", &name[..MAX_NAME_LEN]).is_ok());
    }

    #[test]
    fn reserved_field_names() {
        assert!(validate_field_name("_id").is_err());
        assert!(validate_field_name("_created_at").is_err());
        assert!(validate_field_name("_private").is_ok());
    }
}
