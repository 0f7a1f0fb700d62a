//! Rewrites arbitrary JSON-Schema fragments into the restricted dialect the
//! upstream accepts. Grounded on
//! `provider/google/input.rs::strip_unsupported_schema_fields`'s shape
//! (recursive key-stripping over a `serde_json::Value`, tested inline).

use serde_json::{Map, Value, json};

const MAX_DEPTH: u32 = 10;

const DROPPED_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "minLength",
    "maxLength",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "oneOf",
    "anyOf",
    "allOf",
    "not",
    "if",
    "then",
    "else",
    "$defs",
    "definitions",
    "minProperties",
    "maxProperties",
    "patternProperties",
    "propertyNames",
    "dependencies",
    "dependentRequired",
    "dependentSchemas",
    "default",
    "const",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
    "contentEncoding",
    "contentMediaType",
    "contentSchema",
    "strict",
];

/// Recursively sanitizes a JSON-Schema object into the upstream's restricted
/// dialect. Never fails: unrecognized shapes coerce to safe defaults.
pub fn sanitize(schema: &Value) -> Value {
    sanitize_at_depth(schema, 0)
}

fn sanitize_at_depth(schema: &Value, depth: u32) -> Value {
    let Some(object) = schema.as_object() else {
        return json!({ "type": "STRING" });
    };

    if depth >= MAX_DEPTH {
        return json!({ "type": "STRING" });
    }

    let mut out = Map::new();

    let normalized_type = normalize_type(object.get("type"));
    out.insert("type".to_owned(), Value::String(normalized_type.clone().into()));

    if let Some(Value::String(format)) = object.get("format")
        && matches!(format.as_str(), "date-time" | "date" | "time")
    {
        out.insert("format".to_owned(), Value::String(format.clone()));
    }

    if let Some(description) = object.get("description") {
        out.insert("description".to_owned(), description.clone());
    }

    if let Some(r#enum) = object.get("enum") {
        out.insert("enum".to_owned(), r#enum.clone());
    }

    if let Some(required) = object.get("required") {
        out.insert("required".to_owned(), required.clone());
    }

    if let Some(additional) = object.get("additionalProperties") {
        let value = matches!(additional, Value::Bool(true));
        out.insert("additionalProperties".to_owned(), Value::Bool(value));
    }

    if let Some(properties) = object.get("properties").and_then(Value::as_object) {
        let mut sanitized_properties = Map::new();

        for (key, value) in properties {
            let sanitized = match value {
                Value::String(_) => json!({ "type": "STRING" }),
                Value::Object(_) => sanitize_at_depth(value, depth + 1),
                _ => json!({ "type": "STRING" }),
            };

            sanitized_properties.insert(key.clone(), sanitized);
        }

        out.insert("properties".to_owned(), Value::Object(sanitized_properties));
    } else if normalized_type == "OBJECT" {
        out.insert("properties".to_owned(), Value::Object(Map::new()));
    }

    if let Some(items) = object.get("items") {
        out.insert("items".to_owned(), sanitize_at_depth(items, depth + 1));
    }

    Value::Object(out)
}

fn normalize_type(value: Option<&Value>) -> String {
    let raw = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| !t.eq_ignore_ascii_case("null"))
            .map(str::to_owned)
            .unwrap_or_else(|| "string".to_owned()),
        _ => "string".to_owned(),
    };

    match raw.to_uppercase().as_str() {
        "STRING" => "STRING".to_owned(),
        "NUMBER" => "NUMBER".to_owned(),
        "INTEGER" => "INTEGER".to_owned(),
        "BOOLEAN" => "BOOLEAN".to_owned(),
        "ARRAY" => "ARRAY".to_owned(),
        "OBJECT" => "OBJECT".to_owned(),
        _ => "STRING".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::sanitize;

    #[test]
    fn drops_unsupported_keys() {
        let schema = json!({
            "type": "object",
            "$schema": "http://json-schema.org/draft-07/schema#",
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "age": "number",
            },
            "additionalProperties": "yes",
        });

        let sanitized = sanitize(&schema);

        assert_eq!(sanitized["type"], "OBJECT");
        assert_eq!(sanitized["additionalProperties"], false);
        assert_eq!(sanitized["properties"]["name"]["type"], "STRING");
        assert!(sanitized["properties"]["name"].get("minLength").is_none());
        assert_eq!(sanitized["properties"]["age"]["type"], "STRING");
        assert!(sanitized.get("$schema").is_none());
    }

    #[test]
    fn object_without_properties_gets_empty_map() {
        let sanitized = sanitize(&json!({"type": "object"}));
        assert_eq!(sanitized["properties"], json!({}));
    }

    #[test]
    fn null_and_unknown_types_collapse_to_string() {
        assert_eq!(sanitize(&json!({"type": "null"}))["type"], "STRING");
        assert_eq!(sanitize(&json!({"type": "wat"}))["type"], "STRING");
        assert_eq!(sanitize(&json!({"type": ["null", "integer"]}))["type"], "INTEGER");
    }

    #[test]
    fn is_idempotent() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "array", "items": {"type": "string"}}},
        });

        let once = sanitize(&schema);
        let twice = sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn depth_is_capped() {
        let mut schema = json!({"type": "string"});
        for _ in 0..20 {
            schema = json!({"type": "object", "properties": {"next": schema}});
        }

        // Must not stack-overflow or panic.
        let _ = sanitize(&schema);
    }
}
