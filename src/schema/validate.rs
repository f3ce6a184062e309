//! Document validation
//!
//! Checks are made against a field's textual value, so `"30"` satisfies an
//! `int` field just like `30` does. `array`, `object` and `string` fields
//! only need to be present.

use serde_json::Value;

use crate::error::{AtlasError, Result};

use super::{FieldSchema, FieldType};

/// Text form of a JSON value: strings verbatim, everything else as JSON
pub fn textual_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validate `instance` against `fields`.
///
/// Fails on the first required field that is absent, or the first present
/// field whose value does not parse as its declared type.
pub fn validate_instance(instance: &Value, fields: &[FieldSchema]) -> Result<()> {
    let object = instance
        .as_object()
        .ok_or_else(|| AtlasError::Validation("document must be a JSON object".to_string()))?;

    for field in fields {
        let Some(value) = object.get(&field.name) else {
            if field.required {
                return Err(AtlasError::Validation(format!(
                    "required field '{}' is missing",
                    field.name
                )));
            }
            continue;
        };

        let text = textual_value(value);
        let text = text.trim();
        let ok = match field.field_type {
            FieldType::Int => text.parse::<i64>().is_ok(),
            FieldType::Float => text.parse::<f64>().is_ok(),
            FieldType::Bool => matches!(text, "true" | "false" | "1" | "0"),
            FieldType::String | FieldType::Array | FieldType::Object => true,
        };

        if !ok {
            return Err(AtlasError::Validation(format!(
                "field '{}' must be {}, got {}",
                field.name, field.field_type, value
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn age_required() -> Vec<FieldSchema> {
        vec![FieldSchema::new("age", FieldType::Int, true, false)]
    }

    #[test]
    fn required_int_field() {
        let fields = age_required();
        assert!(validate_instance(&json!({ "name": "John" }), &fields).is_err());
        assert!(validate_instance(&json!({ "age": "abc" }), &fields).is_err());
        assert!(validate_instance(&json!({ "age": "30" }), &fields).is_ok());
        assert!(validate_instance(&json!({ "age": 30 }), &fields).is_ok());
    }

    #[test]
    fn bool_accepts_digits() {
        let fields = vec![FieldSchema::new("active", FieldType::Bool, false, false)];
        for ok in [json!(true), json!("false"), json!(1), json!("0")] {
            assert!(validate_instance(&json!({ "active": ok }), &fields).is_ok());
        }
        assert!(validate_instance(&json!({ "active": "yes" }), &fields).is_err());
    }

    #[test]
    fn containers_only_need_presence() {
        let fields = vec![
            FieldSchema::new("tags", FieldType::Array, true, false),
            FieldSchema::new("meta", FieldType::Object, false, false),
        ];
        assert!(validate_instance(&json!({ "tags": "not-an-array", "meta": 5 }), &fields).is_ok());
        assert!(validate_instance(&json!({ "meta": {} }), &fields).is_err());
    }

    #[test]
    fn float_and_optional() {
        let fields = vec![FieldSchema::new("score", FieldType::Float, false, false)];
        assert!(validate_instance(&json!({}), &fields).is_ok());
        assert!(validate_instance(&json!({ "score": 1.5 }), &fields).is_ok());
        assert!(validate_instance(&json!({ "score": "x1" }), &fields).is_err());
    }

    #[test]
    fn rejects_non_object() {
        assert!(validate_instance(&json!([1, 2]), &[]).is_err());
    }
}
