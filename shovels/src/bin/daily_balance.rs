//! The daily-balance shovel (§4.H): every `skip_interval` (7200 blocks,
//! ≈ one day) walks the full `System.Account` map and buffers one row
//! per address with its free/reserved/frozen balance components.

use std::sync::Arc;

use async_trait::async_trait;
use shovel_chain::decode_single_accountid_key;

use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovels::chainval::{account_frozen_balance, map_get_u128};
use shovels::sql::datetime_literal;
use shovels::tables::{create_daily_balance_table_sql, DAILY_BALANCE_TABLE};
use shovels::{Args, Bootstrap};

const SKIP_INTERVAL: u64 = 7200;

struct DailyBalanceProcessor {
    chain: Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    block_meta: Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: Arc<shovel_warehouse::WarehouseTimestampSource>,
}

#[async_trait]
impl BlockProcessor for DailyBalanceProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let accounts = self.chain.query_map("System", "Account", &hash, &[], 1000).await?;

        for entry in accounts {
            let Some(key_hex) = entry.key.as_str() else { continue };
            let Some(address) = decode_single_accountid_key(key_hex) else { continue };
            let data = &entry.value;
            let free = map_get_u128(data, "free").unwrap_or(0);
            let reserved = map_get_u128(data, "reserved").unwrap_or(0);
            let frozen = account_frozen_balance(data);

            let row = format!(
                "({block_number}, {}, '{}', {free}, {reserved}, {frozen})",
                datetime_literal(ts),
                address.replace('\'', "\\'"),
            );
            self.buffer.insert(DAILY_BALANCE_TABLE, row).await;
        }

        shovels::metrics::record_block_processed("daily_balance");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("daily_balance", SKIP_INTERVAL, &args).await?;
    bootstrap.warehouse.execute(&create_daily_balance_table_sql()).await?;

    let processor = DailyBalanceProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}
