//! A minimal JSON-Schema validator for tool input (spec.md §4.3, §9).
//!
//! Supports the subset the spec calls out: `type`, `required`, `properties`,
//! `enum`, `minimum`/`maximum`, `minLength`/`maxLength`, `items`, and nested
//! `object`/`array` schemas. Reports the violating path rather than just a
//! pass/fail bit, so the executor can build field-level error detail.

use serde_json::Value;

/// A single validation failure, with a JSON-Pointer-ish dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validate `instance` against `schema`, collecting every violation found
/// (rather than failing fast) so the caller can report all of them at once.
pub fn validate(schema: &Value, instance: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    validate_node(schema, instance, "$", &mut violations);
    violations
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn validate_node(schema: &Value, instance: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(ty) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(ty, instance) {
            out.push(Violation::new(
                path,
                format!("expected type \"{ty}\", got {}", kind_name(instance)),
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(instance) {
            out.push(Violation::new(path, "value is not one of the allowed enum values"));
        }
    }

    if let Some(n) = instance.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                out.push(Violation::new(path, format!("must be >= {min}")));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                out.push(Violation::new(path, format!("must be <= {max}")));
            }
        }
    }

    if let Some(s) = instance.as_str() {
        if let Some(min_len) = schema.get("minLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) < min_len {
                out.push(Violation::new(path, format!("must be at least {min_len} characters")));
            }
        }
        if let Some(max_len) = schema.get("maxLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) > max_len {
                out.push(Violation::new(path, format!("must be at most {max_len} characters")));
            }
        }
    }

    if let Some(obj) = instance.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required {
                if let Some(field) = field.as_str() {
                    if !obj.contains_key(field) {
                        out.push(Violation::new(
                            format!("{path}.{field}"),
                            "is required",
                        ));
                    }
                }
            }
        }

        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (key, sub_schema) in props {
                if let Some(value) = obj.get(key) {
                    validate_node(sub_schema, value, &format!("{path}.{key}"), out);
                }
            }
        }
    }

    if let Some(items) = instance.as_array() {
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                validate_node(item_schema, item, &format!("{path}[{i}]"), out);
            }
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
