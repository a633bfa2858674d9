//! The daily-stake shovel (§4.H): every `skip_interval` (7200 blocks)
//! walks the full `SubtensorModule.Stake` double map and buffers one row
//! per `(coldkey, hotkey)` pair with its stake amount.

use std::sync::Arc;

use async_trait::async_trait;
use shovel_chain::decode_double_accountid_key;

use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovels::sql::datetime_literal;
use shovels::tables::{create_daily_stake_table_sql, DAILY_STAKE_TABLE};
use shovels::{Args, Bootstrap};

const SKIP_INTERVAL: u64 = 7200;

struct DailyStakeProcessor {
    chain: Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    block_meta: Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: Arc<shovel_warehouse::WarehouseTimestampSource>,
}

#[async_trait]
impl BlockProcessor for DailyStakeProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let stakes = self.chain.query_map("SubtensorModule", "Stake", &hash, &[], 1000).await?;

        for entry in stakes {
            let Some(key_hex) = entry.key.as_str() else { continue };
            let Some((hotkey, coldkey)) = decode_double_accountid_key(key_hex) else { continue };
            let stake = entry.value.as_int().unwrap_or(0).max(0) as u128;

            let row = format!(
                "({block_number}, {}, '{coldkey}', '{hotkey}', {stake})",
                datetime_literal(ts)
            );
            self.buffer.insert(DAILY_STAKE_TABLE, row).await;
        }

        shovels::metrics::record_block_processed("daily_stake");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("daily_stake", SKIP_INTERVAL, &args).await?;
    bootstrap.warehouse.execute(&create_daily_stake_table_sql()).await?;

    let processor = DailyStakeProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}
