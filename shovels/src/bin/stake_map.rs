//! The stake-map shovel (§4.I, dependency-aware): waits for the `events`
//! and `hotkey_owner_map` shovels to catch up, then keeps an in-memory
//! `(hotkey, coldkey) -> stake` map current and buffers the whole map
//! every processed block.
//!
//! The described refresh trigger — union a per-subnet pending-emission
//! transition with hotkeys touched by `StakeAdded`/`StakeRemoved` events,
//! read via a warehouse-side `agg_stake_events` join — has no warehouse
//! counterpart here: `WarehouseClient` exposes `execute`/`table_exists`/
//! `describe_table` only, no generic `SELECT`. This shovel substitutes
//! the same read-proof diff already used by the owner-map and
//! validator-identities shovels, taken over the stakes map's storage
//! prefix: any stake change anywhere changes that proof, which is a
//! strictly sufficient trigger for "rescan the whole double map" and
//! needs no materialised view at all.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use shovel_chain::decode_double_accountid_key;
use shovel_core::chain_client::{get_read_proof, proof_changed, ChainApi, ReadProof};
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovels::sql::datetime_literal;
use shovels::tables::{create_stake_double_map_table_sql, STAKE_DOUBLE_MAP_TABLE};
use shovels::waitfor::wait_for;
use shovels::{Args, Bootstrap};

/// Stakes map prefix, referenced verbatim in §6.
const STAKES_PREFIX: &str = "0x658faa385070e074c85bf6b568cf055522fbe0bd0cb77b6b6f365f641b0de381";

const DEPENDENCIES: &[&str] = &["events", "hotkey_owner_map"];

struct StakeMapProcessor {
    chain: Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    checkpoint_store: Arc<dyn shovel_core::CheckpointStore>,
    block_meta: Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: Arc<shovel_warehouse::WarehouseTimestampSource>,
    cache: Mutex<Option<(ReadProof, Vec<(String, String, u128)>)>>,
}

#[async_trait]
impl BlockProcessor for StakeMapProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        wait_for(self.checkpoint_store.as_ref(), DEPENDENCIES, block_number).await?;

        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let proof = get_read_proof(self.chain.as_ref(), STAKES_PREFIX, &hash).await?;

        let mut cache = self.cache.lock().await;
        let stakes = match cache.as_ref() {
            Some((prev_proof, prev_stakes)) if !proof_changed(prev_proof, &proof) => prev_stakes.clone(),
            _ => {
                let entries = self.chain.query_map("SubtensorModule", "Stake", &hash, &[], 1000).await?;
                let mut stakes = Vec::with_capacity(entries.len());
                for entry in entries {
                    let Some(key_hex) = entry.key.as_str() else { continue };
                    let Some((hotkey, coldkey)) = decode_double_accountid_key(key_hex) else { continue };
                    let stake = entry.value.as_int().unwrap_or(0).max(0) as u128;
                    stakes.push((hotkey, coldkey, stake));
                }
                stakes
            }
        };
        *cache = Some((proof, stakes.clone()));
        drop(cache);

        for (hotkey, coldkey, stake) in &stakes {
            let row = format!(
                "({block_number}, {}, '{hotkey}', '{coldkey}', {stake})",
                datetime_literal(ts)
            );
            self.buffer.insert(STAKE_DOUBLE_MAP_TABLE, row).await;
        }

        shovels::metrics::record_block_processed("stake_double_map");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("stake_double_map", 1, &args).await?;
    bootstrap.warehouse.execute(&create_stake_double_map_table_sql()).await?;

    let processor = StakeMapProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        checkpoint_store: bootstrap.checkpoint_store.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
        cache: Mutex::new(None),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_list_matches_spec() {
        assert_eq!(DEPENDENCIES, &["events", "hotkey_owner_map"]);
    }
}
