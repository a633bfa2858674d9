//! DDL for the fixed-schema per-shovel output tables (§3: "each shovel
//! owns one … output table, partitioned by month of the timestamp
//! column and ordered by logical keys"). The dynamic event/extrinsic
//! tables are a different animal entirely and live behind
//! `shovel_warehouse::resolver::TableResolver` instead.

/// `ensure` runs once at process start; every statement is
/// `CREATE TABLE IF NOT EXISTS` so repeated calls across restarts are
/// harmless.
pub const ALPHA_TO_TAO_TABLE: &str = "shovel_alpha_to_tao";

pub fn create_alpha_to_tao_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {ALPHA_TO_TAO_TABLE} \
         (block_number UInt64, timestamp DateTime, netuid UInt16, alpha_to_tao Float64) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY (netuid, block_number)"
    )
}

pub const DAILY_BALANCE_TABLE: &str = "shovel_daily_balance";

pub fn create_daily_balance_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {DAILY_BALANCE_TABLE} \
         (block_number UInt64, timestamp DateTime, address String, \
          free UInt128, reserved UInt128, frozen UInt128) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY (address, block_number)"
    )
}

pub const DAILY_STAKE_TABLE: &str = "shovel_daily_stake";

pub fn create_daily_stake_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {DAILY_STAKE_TABLE} \
         (block_number UInt64, timestamp DateTime, coldkey String, hotkey String, stake UInt128) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY (coldkey, hotkey, block_number)"
    )
}

pub const HOTKEY_OWNER_MAP_TABLE: &str = "shovel_hotkey_owner_map";

pub fn create_hotkey_owner_map_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {HOTKEY_OWNER_MAP_TABLE} \
         (block_number UInt64, timestamp DateTime, hotkey String, coldkey String) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY (hotkey, block_number)"
    )
}

pub const VALIDATOR_IDENTITIES_TABLE: &str = "shovel_validator_identities";

pub fn create_validator_identities_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {VALIDATOR_IDENTITIES_TABLE} \
         (block_number UInt64, timestamp DateTime, hotkey String, name String, url String, \
          image String, discord String, description String, additional String) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY (hotkey, block_number)"
    )
}

pub const TAO_PRICE_TABLE: &str = "shovel_tao_price";

pub fn create_tao_price_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {TAO_PRICE_TABLE} \
         (block_number UInt64, timestamp DateTime, price Float64, market_cap Float64, volume Float64) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY block_number"
    )
}

/// The stake-map shovel's own output table. Its checkpoint/shovel name is
/// `stake_double_map` (§4.J names it as a dependency), distinct from the
/// `stake_map` binary name, which only labels the `[[bin]]` target.
pub const STAKE_DOUBLE_MAP_TABLE: &str = "shovel_stake_double_map";

pub fn create_stake_double_map_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {STAKE_DOUBLE_MAP_TABLE} \
         (block_number UInt64, timestamp DateTime, hotkey String, coldkey String, stake UInt128) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY (hotkey, coldkey, block_number)"
    )
}

pub const SUBNETS_TABLE: &str = "shovel_subnets";

pub fn create_subnets_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {SUBNETS_TABLE} \
         (block_number UInt64, timestamp DateTime, subnet_id UInt16, neuron_uid UInt16, \
          hotkey String, coldkey String, stake UInt128, active Bool, rank Float64, \
          trust Float64, emission UInt128, consensus Float64, incentive Float64, \
          dividends Float64, last_update UInt64, pruning_score Float64, \
          validator_trust Float64, validator_permit Bool, \
          axon_ip String, axon_port UInt16, axon_ip_type UInt8, axon_protocol UInt8) \
         ENGINE = ReplacingMergeTree \
         PARTITION BY toYYYYMM(timestamp) \
         ORDER BY (subnet_id, neuron_uid, block_number)"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_uses_replacing_merge_tree_and_month_partition() {
        let ddls = [
            create_alpha_to_tao_table_sql(),
            create_daily_balance_table_sql(),
            create_daily_stake_table_sql(),
            create_hotkey_owner_map_table_sql(),
            create_validator_identities_table_sql(),
            create_tao_price_table_sql(),
            create_stake_double_map_table_sql(),
            create_subnets_table_sql(),
        ];
        for sql in ddls {
            assert!(sql.contains("ReplacingMergeTree"), "{sql}");
        }
    }
}
