//! The block-timestamps shovel (§4.H): one row `(block_number, timestamp)`
//! per block. Its own output table, `shovel_block_timestamps`, is the
//! very table every other shovel's `BlockMetadataCache` reads from, so
//! this shovel queries the chain directly rather than going through that
//! cache (which would be circular).

use async_trait::async_trait;
use chrono::DateTime;

use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_warehouse::ddl::BLOCK_TIMESTAMPS_TABLE;
use shovels::{sql::datetime_literal, Args, Bootstrap};

struct BlockTimestampsProcessor {
    chain: std::sync::Arc<dyn ChainApi>,
    buffer: shovel_core::WriteBuffer,
}

#[async_trait]
impl BlockProcessor for BlockTimestampsProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let hash = self.chain.get_block_hash(block_number).await?;
        let now = self.chain.query("Timestamp", "Now", &hash, &[]).await?;
        let millis = now
            .as_int()
            .ok_or_else(|| ShovelError::processing("Timestamp.Now did not decode to an integer"))?;
        let ts = DateTime::from_timestamp_millis(millis as i64)
            .ok_or_else(|| ShovelError::processing("Timestamp.Now out of range"))?;

        let row = format!("({block_number}, {})", datetime_literal(ts));
        self.buffer.insert(BLOCK_TIMESTAMPS_TABLE, row).await;
        shovels::metrics::record_block_processed("block_timestamps");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("block_timestamps", 1, &args).await?;
    let processor = BlockTimestampsProcessor { chain: bootstrap.chain.clone(), buffer: bootstrap.buffer.clone() };
    bootstrap.run(&processor).await?;
    Ok(())
}
