//! Recursive column-name/type/value derivation from a duck-typed payload.
//!
//! Grounded directly in the column-fingerprint idea behind a versioned
//! schema registry (teacher's `Schema`/`FieldDef` pair), but driven off a
//! runtime `Value` rather than a pre-registered ABI: there is no registry
//! to consult, every new shape is derived on the spot and versioned by
//! comparing against whatever table already exists (see `table.rs`).

use crate::value::Value;

/// One derived column: its name, ClickHouse-dialect SQL type, and the
/// leaf value it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub name: String,
    pub sql_type: String,
    pub value: Value,
}

/// Walk `item` and derive one `DerivedColumn` per non-null leaf.
///
/// - Map keys nest with `__` (`parent__child`).
/// - Tuple/positional elements nest with `.tuple_i` (`parent.tuple_0`).
/// - A sequence of scalars collapses into a single `Array(..)`-typed
///   column rather than being expanded index-by-index.
/// - `Null` leaves are omitted entirely: the column simply isn't emitted
///   for that payload, it is not written as SQL NULL (events context);
///   extrinsics do the NULL-literal handling separately in `literal.rs`.
pub fn derive_columns(item: &Value, parent_key: Option<&str>) -> Vec<DerivedColumn> {
    let mut out = Vec::new();
    derive_into(item, parent_key, &mut out);
    out
}

fn derive_into(item: &Value, parent_key: Option<&str>, out: &mut Vec<DerivedColumn>) {
    match item {
        Value::Map(fields) => {
            for (key, value) in fields {
                let name = join(parent_key, "__", key);
                derive_into(value, Some(&name), out);
            }
        }
        Value::Tuple(items) => {
            for (i, value) in items.iter().enumerate() {
                let name = join_tuple(parent_key, i);
                derive_into(value, Some(&name), out);
            }
        }
        Value::Seq(items) if item.is_scalar_sequence() => {
            let inner_type = items.first().map(sql_scalar_type).unwrap_or("UInt8");
            out.push(DerivedColumn {
                name: parent_key.unwrap_or("value").to_string(),
                sql_type: format!("Array({inner_type})"),
                value: item.clone(),
            });
        }
        Value::Seq(items) => {
            // Non-scalar sequence: expand positionally like a tuple so
            // that nested maps inside a list still get concrete columns.
            for (i, value) in items.iter().enumerate() {
                let name = join_tuple(parent_key, i);
                derive_into(value, Some(&name), out);
            }
        }
        Value::Null => {
            // Omitted: no column emitted for an absent leaf.
        }
        scalar => {
            out.push(DerivedColumn {
                name: parent_key.unwrap_or("value").to_string(),
                sql_type: sql_scalar_type(scalar).to_string(),
                value: scalar.clone(),
            });
        }
    }
}

fn join(parent: Option<&str>, sep: &str, key: &str) -> String {
    match parent {
        Some(p) => format!("{p}{sep}{key}"),
        None => key.to_string(),
    }
}

fn join_tuple(parent: Option<&str>, index: usize) -> String {
    match parent {
        Some(p) => format!("{p}.tuple_{index}"),
        None => format!("tuple_{index}"),
    }
}

fn sql_scalar_type(v: &Value) -> &'static str {
    match v {
        Value::String(_) => "String",
        Value::Int(_) => "Int64",
        Value::Float(_) => "Float64",
        Value::Bool(_) => "Bool",
        _ => "String",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_map_joins_with_double_underscore() {
        let payload = Value::Map(vec![(
            "foo".into(),
            Value::Map(vec![("bar".into(), Value::Int(1))]),
        )]);
        let cols = derive_columns(&payload, None);
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name, "foo__bar");
        assert_eq!(cols[0].sql_type, "Int64");
    }

    #[test]
    fn tuple_joins_with_tuple_index() {
        let payload = Value::Map(vec![(
            "range".into(),
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
        )]);
        let cols = derive_columns(&payload, None);
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["range.tuple_0", "range.tuple_1"]);
    }

    #[test]
    fn null_leaf_is_omitted() {
        let payload = Value::Map(vec![
            ("present".into(), Value::Int(1)),
            ("absent".into(), Value::Null),
        ]);
        let cols = derive_columns(&payload, None);
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name, "present");
    }

    #[test]
    fn scalar_sequence_collapses_to_array_column() {
        let payload = Value::Map(vec![(
            "weights".into(),
            Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        )]);
        let cols = derive_columns(&payload, None);
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name, "weights");
        assert_eq!(cols[0].sql_type, "Array(Int64)");
    }
}
