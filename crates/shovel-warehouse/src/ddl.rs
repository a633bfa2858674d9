//! DDL for the two warehouse tables every shovel process shares:
//! checkpoints and block timestamps. Per-shovel output tables and the
//! dynamic event/extrinsic tables are created by each shovel/`resolver`
//! respectively, not here.

/// `shovel_checkpoints(shovel_name, block_number)`, deduplicated on
/// `shovel_name` by a replacing-merge engine (§3).
pub const CHECKPOINTS_TABLE: &str = "shovel_checkpoints";

pub fn create_checkpoints_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {CHECKPOINTS_TABLE} \
         (shovel_name String, block_number UInt64) \
         ENGINE = ReplacingMergeTree \
         ORDER BY shovel_name"
    )
}

/// `shovel_block_timestamps(block_number, timestamp)`, the table the
/// block-metadata cache's 10k-row windows are loaded from (§4.C).
pub const BLOCK_TIMESTAMPS_TABLE: &str = "shovel_block_timestamps";

pub fn create_block_timestamps_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {BLOCK_TIMESTAMPS_TABLE} \
         (block_number UInt64, timestamp DateTime) \
         ENGINE = ReplacingMergeTree \
         ORDER BY block_number"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_ddl_uses_replacing_merge_tree() {
        assert!(create_checkpoints_table_sql().contains("ReplacingMergeTree"));
    }
}
