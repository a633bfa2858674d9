//! Small row-formatting helpers shared by every shovel binary.

use chrono::{DateTime, Utc};

/// A `DateTime` SQL literal, e.g. `'2024-01-02 03:04:05'`.
pub fn datetime_literal(ts: DateTime<Utc>) -> String {
    format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S"))
}

/// A string SQL literal, single-quoted with embedded quotes escaped.
pub fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "\\'"))
}

/// An `Option<String>` as `NULL` or a string literal.
pub fn nullable_string_literal(s: &Option<String>) -> String {
    match s {
        Some(s) => string_literal(s),
        None => "NULL".to_string(),
    }
}

/// An `Option<u64>` as `NULL` or the plain integer.
pub fn nullable_int_literal(n: Option<u64>) -> String {
    match n {
        Some(n) => n.to_string(),
        None => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_literal_is_single_quoted() {
        let ts = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(datetime_literal(ts), "'1970-01-01 00:00:00'");
    }
}
