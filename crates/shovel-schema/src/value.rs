//! The tagged variant every duck-typed chain payload is normalized into
//! before column derivation runs.
//!
//! The chain client hands back SCALE-decoded values as arbitrarily nested
//! Rust data (maps, tuples, scalars); rather than pattern-matching on that
//! directly everywhere, every payload is first normalized into `Value`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A runtime-typed chain payload value, mirroring the spec's
/// `Value = String | Int | Float | Null | Seq(Value) | Map(String→Value)`.
///
/// `Tuple` is kept distinct from `Seq` because tuple elements derive
/// columns positionally (`.tuple_0`, `.tuple_1`, …) while sequences of
/// scalars instead collapse into a single `Array(..)`-typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i128),
    Float(f64),
    Bool(bool),
    Null,
    Seq(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// `true` for `Seq`/`Tuple` with exclusively scalar (non-Map,
    /// non-nested-Seq) elements — the kind the dynamic-schema engine
    /// collapses into a single `Array(..)` column rather than expanding.
    pub fn is_scalar_sequence(&self) -> bool {
        match self {
            Value::Seq(items) => items.iter().all(|v| {
                matches!(v, Value::String(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_))
            }),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
            Value::Seq(items) | Value::Tuple(items) => {
                let parts: Vec<_> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(fields) => {
                let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v as i128)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i128)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sequence_detection() {
        let scalars = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
        assert!(scalars.is_scalar_sequence());

        let nested = Value::Seq(vec![Value::Map(vec![("a".into(), Value::Int(1))])]);
        assert!(!nested.is_scalar_sequence());
    }

    #[test]
    fn display_matches_nested_shape() {
        let v = Value::Map(vec![("foo".into(), Value::String("a".into()))]);
        assert_eq!(v.to_string(), "{foo: a}");
    }
}
