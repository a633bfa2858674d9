//! The hotkey→coldkey owner-map shovel (§4.H, §8 scenario 5): per block,
//! diff this block's `state_getReadProof` result against the previous
//! block's at the owner-map prefix; an unchanged proof means the map
//! itself didn't change, so the previous block's `(hotkey, coldkey)`
//! rows are simply rebound to the current block/timestamp instead of
//! re-querying the whole map.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use shovel_chain::decode_single_accountid_key;
use shovel_core::chain_client::{get_read_proof, proof_changed, ChainApi, ReadProof};
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovels::sql::datetime_literal;
use shovels::tables::{create_hotkey_owner_map_table_sql, HOTKEY_OWNER_MAP_TABLE};
use shovels::{Args, Bootstrap};

/// Prefix referenced verbatim in §6 ("Owners map").
const OWNERS_PREFIX: &str = "0x658faa385070e074c85bf6b568cf0555eca6b7a1fdc9f689184ecb4f359c0518";

struct OwnerMapProcessor {
    chain: Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    block_meta: Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: Arc<shovel_warehouse::WarehouseTimestampSource>,
    cache: Mutex<Option<(ReadProof, Vec<(String, String)>)>>,
}

#[async_trait]
impl BlockProcessor for OwnerMapProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let proof = get_read_proof(self.chain.as_ref(), OWNERS_PREFIX, &hash).await?;

        let mut cache = self.cache.lock().await;
        let owners = match cache.as_ref() {
            Some((prev_proof, prev_owners)) if !proof_changed(prev_proof, &proof) => {
                prev_owners.clone()
            }
            _ => {
                let entries = self.chain.query_map("SubtensorModule", "Owner", &hash, &[], 1000).await?;
                let mut owners = Vec::with_capacity(entries.len());
                for entry in entries {
                    let Some(key_hex) = entry.key.as_str() else { continue };
                    let Some(hotkey) = decode_single_accountid_key(key_hex) else { continue };
                    let Some(coldkey) = entry.value.as_str() else { continue };
                    owners.push((hotkey, coldkey.to_string()));
                }
                owners
            }
        };
        *cache = Some((proof, owners.clone()));
        drop(cache);

        for (hotkey, coldkey) in &owners {
            let row = format!("({block_number}, {}, '{hotkey}', '{coldkey}')", datetime_literal(ts));
            self.buffer.insert(HOTKEY_OWNER_MAP_TABLE, row).await;
        }

        shovels::metrics::record_block_processed("hotkey_owner_map");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("hotkey_owner_map", 1, &args).await?;
    bootstrap.warehouse.execute(&create_hotkey_owner_map_table_sql()).await?;

    let processor = OwnerMapProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
        cache: Mutex::new(None),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}
