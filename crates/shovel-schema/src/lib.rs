//! # shovel-schema
//!
//! The dynamic-schema engine: a duck-typed `Value` normal form, recursive
//! column derivation from it, SS58 address classification for ordering
//! keys, and versioned table naming. No network or database access lives
//! here — this crate only decides names, types, and literals; the
//! warehouse client drives the actual `CREATE TABLE`/`DESCRIBE TABLE`
//! round trips on top of it.

pub mod columns;
pub mod literal;
pub mod ss58;
pub mod table;
pub mod value;

pub use columns::{derive_columns, DerivedColumn};
pub use literal::format_literal;
pub use ss58::{is_valid_ss58_address, ss58_encode};
pub use table::{base_table_name, columns_match, prefix_columns, versioned_table_name, TableKind, VersionsExhausted, MAX_VERSIONS};
pub use value::Value;
