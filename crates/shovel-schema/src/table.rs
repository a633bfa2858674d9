//! Versioned table naming for the dynamic-schema engine.
//!
//! This module only holds the pure, synchronous pieces: how a table name
//! is built for a given version, the fixed prefix columns every dynamic
//! table carries ahead of its derived columns, and the column-set
//! comparison used to decide whether an existing table still matches a
//! payload's shape. The actual `v0..v49` probing loop needs a `DESCRIBE
//! TABLE` round trip per candidate, so it's driven by the warehouse client
//! (the only crate that can talk to the database) and built on top of the
//! helpers here.

/// Upper bound on how many shape-versions a single (module, name) pair may
/// accumulate before the engine gives up and treats it as a fatal
/// misconfiguration rather than minting `_v50`.
pub const MAX_VERSIONS: u32 = 50;

/// The kind of shovel a dynamic table belongs to, which determines its
/// fixed prefix columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Events,
    Extrinsics,
}

/// Fixed, always-present columns that precede a payload's derived columns,
/// as `(name, sql_type)` pairs, in emission order.
pub fn prefix_columns(kind: TableKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        TableKind::Events => &[
            ("block_number", "UInt64"),
            ("timestamp", "DateTime"),
            ("event_index", "UInt64"),
        ],
        TableKind::Extrinsics => &[
            ("block_number", "UInt64"),
            ("timestamp", "DateTime"),
            ("extrinsic_index", "UInt64"),
            ("call_function", "String"),
            ("call_module", "String"),
            ("success", "Bool"),
            ("address", "Nullable(String)"),
            ("nonce", "Nullable(UInt64)"),
            ("tip", "Nullable(UInt64)"),
        ],
    }
}

/// Build the base, version-less identifier a dynamic table's name is
/// derived from, e.g. `events_shovel_subtensormodule_stakeadded`.
pub fn base_table_name(kind: TableKind, module: &str, name: &str) -> String {
    let kind_segment = match kind {
        TableKind::Events => "events_shovel",
        TableKind::Extrinsics => "shovel_extrinsics",
    };
    format!(
        "{kind_segment}_{}_{}",
        module.to_lowercase(),
        name.to_lowercase()
    )
}

/// Append the version suffix a base name needs once probing has settled on
/// a concrete version.
pub fn versioned_table_name(base: &str, version: u32) -> String {
    format!("{base}_v{version}")
}

/// `true` if `existing` (the column names a `DESCRIBE TABLE` returned for
/// some prior version) carries exactly the same names as `expected`, in
/// the same order — the fingerprint is the *ordered* tuple of column
/// names (§3/§4.F), so a reordering counts as a shape drift just like an
/// added or removed column, and a new version is needed.
pub fn columns_match(expected: &[String], existing: &[String]) -> bool {
    expected == existing
}

/// Error returned when the version probing loop a warehouse-side caller
/// drives runs past [`MAX_VERSIONS`] without finding a free or matching
/// slot.
#[derive(Debug, thiserror::Error)]
#[error("table '{base}' has exceeded {MAX_VERSIONS} shape versions")]
pub struct VersionsExhausted {
    pub base: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_lowercases_and_joins() {
        assert_eq!(
            base_table_name(TableKind::Events, "SubtensorModule", "StakeAdded"),
            "events_shovel_subtensormodule_stakeadded"
        );
    }

    #[test]
    fn extrinsics_base_name_uses_the_shovel_extrinsics_prefix() {
        assert_eq!(
            base_table_name(TableKind::Extrinsics, "SubtensorModule", "ServeAxon"),
            "shovel_extrinsics_subtensormodule_serveaxon"
        );
    }

    #[test]
    fn versioned_name_appends_suffix() {
        assert_eq!(versioned_table_name("events_shovel_foo_bar", 3), "events_shovel_foo_bar_v3");
    }

    #[test]
    fn columns_match_is_order_sensitive() {
        let expected = vec!["a".to_string(), "b".to_string()];
        let same_order = vec!["a".to_string(), "b".to_string()];
        let reordered = vec!["b".to_string(), "a".to_string()];
        assert!(columns_match(&expected, &same_order));
        assert!(!columns_match(&expected, &reordered));
    }

    #[test]
    fn columns_match_detects_added_column() {
        let expected = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let existing = vec!["a".to_string(), "b".to_string()];
        assert!(!columns_match(&expected, &existing));
    }

    #[test]
    fn extrinsics_prefix_has_nullable_address() {
        let cols = prefix_columns(TableKind::Extrinsics);
        assert!(cols.contains(&("address", "Nullable(String)")));
    }
}
