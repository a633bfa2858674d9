//! The alpha→tao exchange-rate shovel (§4.H): one row per subnet per
//! block, `alpha_to_tao = SubnetTAO / SubnetAlphaIn` (0 when the divisor
//! is 0 rather than NaN/error, §8 scenario 4).

use std::sync::Arc;

use async_trait::async_trait;
use shovel_chain::decode_identity_u16_key;

use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovel_schema::Value;
use shovels::sql::datetime_literal;
use shovels::tables::{create_alpha_to_tao_table_sql, ALPHA_TO_TAO_TABLE};
use shovels::{Args, Bootstrap};

struct AlphaToTaoProcessor {
    chain: Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    block_meta: Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: Arc<shovel_warehouse::WarehouseTimestampSource>,
}

#[async_trait]
impl BlockProcessor for AlphaToTaoProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let netuids = self
            .chain
            .query_map("SubtensorModule", "NetworksAdded", &hash, &[], 1000)
            .await?;

        for entry in netuids {
            let Some(key_hex) = entry.key.as_str() else { continue };
            let Some(netuid) = decode_identity_u16_key(key_hex) else { continue };

            let tao = self
                .chain
                .query("SubtensorModule", "SubnetTAO", &hash, &[Value::Int(netuid as i128)])
                .await?
                .as_int()
                .unwrap_or(0);
            let alpha_in = self
                .chain
                .query("SubtensorModule", "SubnetAlphaIn", &hash, &[Value::Int(netuid as i128)])
                .await?
                .as_int()
                .unwrap_or(0);

            let ratio = if alpha_in == 0 { 0.0 } else { tao as f64 / alpha_in as f64 };

            let row = format!("({block_number}, {}, {netuid}, {ratio})", datetime_literal(ts));
            self.buffer.insert(ALPHA_TO_TAO_TABLE, row).await;
        }

        shovels::metrics::record_block_processed("alpha_to_tao");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("alpha_to_tao", 1, &args).await?;
    bootstrap.warehouse.execute(&create_alpha_to_tao_table_sql()).await?;

    let processor = AlphaToTaoProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}
