//! Small helpers for picking typed fields out of a decoded [`Value`]
//! (the shape `ChainApi::query`/`query_map` hand back), shared by the
//! simple per-block shovels (§4.H) so none of them re-derives the same
//! `Value::Map` field lookup.

use shovel_schema::Value;

/// Look up `field` inside a `Value::Map`; `None` if `v` isn't a map or
/// the field is absent.
pub fn map_get<'a>(v: &'a Value, field: &str) -> Option<&'a Value> {
    match v {
        Value::Map(fields) => fields.iter().find(|(k, _)| k == field).map(|(_, val)| val),
        _ => None,
    }
}

/// `map_get` widened to `u128` — storage balances and stakes are
/// unsigned on chain; `Value::Int` stays signed because it is the single
/// integer variant the dynamic-schema engine needs.
pub fn map_get_u128(v: &Value, field: &str) -> Option<u128> {
    map_get(v, field).and_then(Value::as_int).map(|n| n.max(0) as u128)
}

pub fn map_get_str<'a>(v: &'a Value, field: &str) -> Option<&'a str> {
    map_get(v, field).and_then(Value::as_str)
}

pub fn map_get_bool(v: &Value, field: &str) -> bool {
    matches!(map_get(v, field), Some(Value::Bool(true)))
}

/// Widened to `f64` — the neuron snapshot's normalized scalar fields
/// (rank, trust, consensus, …) arrive as fixed-point integers on chain
/// but are stored as `Float64` columns, matching how `alpha_to_tao`
/// already turns an integer ratio into a float for its own column.
pub fn map_get_f64(v: &Value, field: &str) -> f64 {
    match map_get(v, field) {
        Some(Value::Float(f)) => *f,
        Some(Value::Int(i)) => *i as f64,
        _ => 0.0,
    }
}

/// System.Account's `frozen` field, falling back to `misc_frozen +
/// fee_frozen` on runtimes that haven't migrated to the single-field
/// layout yet (§4.H: "when `frozen` is absent use `misc_frozen +
/// fee_frozen`").
pub fn account_frozen_balance(data: &Value) -> u128 {
    if let Some(frozen) = map_get_u128(data, "frozen") {
        return frozen;
    }
    map_get_u128(data, "misc_frozen").unwrap_or(0) + map_get_u128(data, "fee_frozen").unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_get_finds_named_field() {
        let v = Value::Map(vec![("free".into(), Value::Int(5))]);
        assert_eq!(map_get_u128(&v, "free"), Some(5));
        assert_eq!(map_get_u128(&v, "missing"), None);
    }

    #[test]
    fn frozen_balance_falls_back_to_misc_plus_fee() {
        let v = Value::Map(vec![
            ("misc_frozen".into(), Value::Int(2)),
            ("fee_frozen".into(), Value::Int(3)),
        ]);
        assert_eq!(account_frozen_balance(&v), 5);
    }

    #[test]
    fn frozen_balance_prefers_single_field() {
        let v = Value::Map(vec![("frozen".into(), Value::Int(9))]);
        assert_eq!(account_frozen_balance(&v), 9);
    }
}
