//! SQL-literal formatting for extrinsic argument values.
//!
//! Events only ever buffer pre-formatted scalars (the write buffer treats
//! a row as an opaque tuple), but extrinsics additionally need their
//! derived values turned into literal SQL text: strings single-quoted,
//! nulls as `NULL`, scalar arrays left as ClickHouse array literals, and
//! arrays of non-scalar values flattened to a JSON-encoded string.

use crate::value::Value;

/// Render `v` as a SQL literal suitable for splicing into an `INSERT …
/// VALUES` tuple.
pub fn format_literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::String(s) => format!("'{}'", escape_single_quotes(s)),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => if *b { "true".to_string() } else { "false".to_string() },
        Value::Seq(items) if v.is_scalar_sequence() => {
            let parts: Vec<_> = items.iter().map(format_literal).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Seq(_) | Value::Tuple(_) | Value::Map(_) => {
            let json = serde_json::to_string(&JsonValueView(v)).unwrap_or_default();
            format!("'{}'", escape_single_quotes(&json))
        }
    }
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "\\'")
}

/// A thin serde_json::Serialize wrapper so a nested `Value` can be
/// JSON-encoded for the "array of non-scalar" literal case without giving
/// `Value` a permanent, possibly-lossy `Serialize` impl.
struct JsonValueView<'a>(&'a Value);

impl<'a> serde::Serialize for JsonValueView<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::{SerializeMap, SerializeSeq};
        match self.0 {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(n) => serializer.serialize_i128(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Null => serializer.serialize_none(),
            Value::Seq(items) | Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&JsonValueView(item))?;
                }
                seq.end()
            }
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, &JsonValueView(v))?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_single_quoted() {
        assert_eq!(format_literal(&Value::String("hello".into())), "'hello'");
    }

    #[test]
    fn null_becomes_sql_null() {
        assert_eq!(format_literal(&Value::Null), "NULL");
    }

    #[test]
    fn scalar_array_stays_array_literal() {
        let v = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(format_literal(&v), "[1,2]");
    }

    #[test]
    fn nested_array_becomes_json_string() {
        let v = Value::Seq(vec![Value::Map(vec![("a".into(), Value::Int(1))])]);
        assert_eq!(format_literal(&v), "'[{\"a\":1}]'");
    }

    #[test]
    fn embedded_quote_is_escaped() {
        assert_eq!(format_literal(&Value::String("O'Brien".into())), "'O\\'Brien'");
    }
}
