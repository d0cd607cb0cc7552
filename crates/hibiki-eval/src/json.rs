//! JSON serialization of runtime values.

use crate::structural::{CopyOptions, deep_copy};
use crate::{EvalError, Value};

/// Largest magnitude rendered as a JSON integer.
const MAX_JSON_INT: f64 = 9e15;

#[derive(Debug, Clone, Copy)]
pub struct JsonOptions {
    pub pretty: bool,
    pub resolve_lvalues: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            resolve_lvalues: true,
        }
    }
}

impl JsonOptions {
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            ..Self::default()
        }
    }
}

/// Convert a value to a `serde_json::Value`. Cycles are an error.
pub fn to_json_value(value: &Value, opts: JsonOptions) -> Result<serde_json::Value, EvalError> {
    let copy = deep_copy(
        value,
        CopyOptions {
            resolve_lvalues: opts.resolve_lvalues,
        },
    )?;
    Ok(convert(&copy))
}

/// Serialize a value to a JSON string.
pub fn to_json(value: &Value, opts: JsonOptions) -> Result<String, EvalError> {
    let json = to_json_value(value, opts)?;
    let text = if opts.pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map_err(|e| EvalError::function("json", e.to_string()))
}

fn convert(value: &Value) -> serde_json::Value {
    match value {
        Value::Null | Value::NoAttr => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number(*n),
        Value::String(s) => serde_json::Value::String(s.as_str().to_string()),
        Value::Array(items) => serde_json::Value::Array(items.borrow().iter().map(convert).collect()),
        Value::Object(fields) => serde_json::Value::Object(
            fields
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), convert(v)))
                .collect(),
        ),
        other => serde_json::Value::String(other.to_display_string()),
    }
}

fn number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < MAX_JSON_INT {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Blob;
    use indexmap::IndexMap;

    #[test]
    fn test_scalars_and_order() {
        let mut fields = IndexMap::new();
        fields.insert("z".to_string(), Value::Number(1.0));
        fields.insert("a".to_string(), Value::Number(2.5));
        fields.insert("n".to_string(), Value::Number(f64::NAN));
        fields.insert("missing".to_string(), Value::NoAttr);
        let v = Value::object(fields);
        assert_eq!(
            to_json(&v, JsonOptions::default()).unwrap(),
            r#"{"z":1,"a":2.5,"n":null,"missing":null}"#
        );
    }

    #[test]
    fn test_specials_render_as_strings() {
        let v = Value::array(vec![Value::blob(Blob::from_bytes("text/plain", b"hi"))]);
        assert_eq!(
            to_json(&v, JsonOptions::default()).unwrap(),
            r#"["[hibikiblob type=text/plain len=2]"]"#
        );
    }

    #[test]
    fn test_cycle_is_error() {
        let v = Value::array(vec![]);
        v.as_array().unwrap().borrow_mut().push(v.clone());
        assert!(matches!(
            to_json(&v, JsonOptions::default()),
            Err(EvalError::Cycle { .. })
        ));
    }

    #[test]
    fn test_pretty() {
        let v = Value::array(vec![Value::Number(1.0)]);
        assert_eq!(to_json(&v, JsonOptions::pretty()).unwrap(), "[\n  1\n]");
    }
}
