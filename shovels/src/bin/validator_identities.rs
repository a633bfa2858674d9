//! The validator-identities shovel (§3, §4.H; supplemented from
//! `original_source` — dropped from the distilled component table but
//! carried forward as an informational extension that gates nothing
//! else). Same read-proof-gated "skip unchanged" idiom as the owner map,
//! against the `Registry` pallet's identity storage.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use shovel_core::chain_client::{get_read_proof, proof_changed, ChainApi, ReadProof};
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovel_schema::Value;
use shovels::chainval::map_get_str;
use shovels::sql::datetime_literal;
use shovels::tables::{create_validator_identities_table_sql, VALIDATOR_IDENTITIES_TABLE};
use shovels::{Args, Bootstrap};

/// No verbatim storage prefix is given for the identity map (§3 notes
/// this shovel as a supplemented feature without a fixed hex constant);
/// this is the standard `twox128("Registry") ++ twox128("IdentityOf")`
/// prefix used by Substrate chains carrying the identity pallet under
/// its default pallet name, kept as a named constant so a deployment
/// against a renamed pallet only needs to change this one line.
const IDENTITY_PREFIX: &str = "0xa486910c748ed3e3507d4b2bcdb17182bd260e8833a82d7fa6dc9cce7d6e427d";

struct ValidatorIdentitiesProcessor {
    chain: Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    block_meta: Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: Arc<shovel_warehouse::WarehouseTimestampSource>,
    cache: Mutex<Option<(ReadProof, Vec<(String, Value)>)>>,
}

fn identity_row(block_number: u64, ts: chrono::DateTime<chrono::Utc>, hotkey: &str, identity: &Value) -> String {
    let field = |name: &str| map_get_str(identity, name).unwrap_or("").replace('\'', "\\'");
    format!(
        "({block_number}, {}, '{}', '{}', '{}', '{}', '{}', '{}', '{}')",
        datetime_literal(ts),
        hotkey.replace('\'', "\\'"),
        field("name"),
        field("url"),
        field("image"),
        field("discord"),
        field("description"),
        field("additional"),
    )
}

#[async_trait]
impl BlockProcessor for ValidatorIdentitiesProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let proof = get_read_proof(self.chain.as_ref(), IDENTITY_PREFIX, &hash).await?;

        let mut cache = self.cache.lock().await;
        let identities = match cache.as_ref() {
            Some((prev_proof, prev_identities)) if !proof_changed(prev_proof, &proof) => {
                prev_identities.clone()
            }
            _ => {
                let entries = self
                    .chain
                    .query_map("Registry", "IdentityOf", &hash, &[], 1000)
                    .await?;
                let mut identities = Vec::with_capacity(entries.len());
                for entry in entries {
                    let Some(key_hex) = entry.key.as_str() else { continue };
                    let Some(hotkey) = shovel_chain::decode_single_accountid_key(key_hex) else { continue };
                    identities.push((hotkey, entry.value));
                }
                identities
            }
        };
        *cache = Some((proof, identities.clone()));
        drop(cache);

        for (hotkey, identity) in &identities {
            let row = identity_row(block_number, ts, hotkey, identity);
            self.buffer.insert(VALIDATOR_IDENTITIES_TABLE, row).await;
        }

        shovels::metrics::record_block_processed("validator_identities");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("validator_identities", 1, &args).await?;
    bootstrap.warehouse.execute(&create_validator_identities_table_sql()).await?;

    let processor = ValidatorIdentitiesProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
        cache: Mutex::new(None),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}
