//! The warehouse client contract every shovel and the write buffer
//! program against. The concrete implementation (connect-and-ping,
//! reserved-keyword escaping, the actual `clickhouse` crate wiring) lives
//! in `shovel-warehouse` — that driver is out of scope here (§1).

use async_trait::async_trait;

use crate::error::ShovelError;

/// Column name/type pairs as `DESCRIBE TABLE` reports them, in column
/// order.
pub type TableColumns = Vec<(String, String)>;

/// A per-worker handle onto the analytical warehouse.
///
/// Connect-and-ping happens on first use, with a bounded linear retry
/// (10 attempts, 1s apart per §4.A); repeated `execute` calls reuse the
/// same connection. `table_exists` is cached by callers — the client
/// itself only answers the question, it does not assume the result is
/// stable across calls.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Run a statement with no expected result rows (`CREATE TABLE`,
    /// `INSERT`, …).
    async fn execute(&self, sql: &str) -> Result<(), ShovelError>;

    /// `SHOW TABLES LIKE` check for a single table.
    async fn table_exists(&self, name: &str) -> Result<bool, ShovelError>;

    /// `DESCRIBE TABLE`, as ordered `(name, type)` pairs.
    async fn describe_table(&self, name: &str) -> Result<TableColumns, ShovelError>;
}

/// The fixed set of identifiers that must be backtick-quoted when used as
/// a column or table name, taken verbatim from the source warehouse
/// layer's reserved-word list (§4.A).
pub const RESERVED_KEYWORDS: &[&str] = &[
    "INDEX", "ENGINE", "TABLE", "DATABASE", "ORDER", "BY", "PRIMARY", "KEY", "UNIQUE",
    "PARTITION", "TTL", "SETTINGS", "FORMAT", "ALIAS", "SAMPLE", "AS", "WHERE", "HAVING", "IN",
    "LIMIT", "UNION", "ALL", "SELECT", "INSERT", "UPDATE", "DELETE", "WITH", "ALTER", "DROP",
    "RENAME", "OPTIMIZE",
];

/// Backtick-quote `identifier` if it case-insensitively matches a
/// reserved keyword, otherwise return it unchanged.
pub fn escape_identifier(identifier: &str) -> String {
    let upper = identifier.to_uppercase();
    if RESERVED_KEYWORDS.contains(&upper.as_str()) {
        format!("`{identifier}`")
    } else {
        identifier.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_word_gets_backticked() {
        assert_eq!(escape_identifier("order"), "`order`");
        assert_eq!(escape_identifier("Table"), "`Table`");
    }

    #[test]
    fn ordinary_identifier_is_untouched() {
        assert_eq!(escape_identifier("block_number"), "block_number");
    }
}
