//! The subnets shovel (§4.J, dependency-aware): waits for `extrinsics`,
//! `stake_double_map`, and `hotkey_owner_map` to catch up, pulls a neuron
//! snapshot per subnet, merges in ownership/stake and axon-serving
//! state, and buffers one row per `(subnet, neuron)`.
//!
//! Two steps in the source description read from warehouse tables this
//! crate's `WarehouseClient` cannot arbitrarily `SELECT` against
//! (`execute`/`table_exists`/`describe_table` only, no generic query):
//!
//! - Resolving a neuron's `(coldkey, stake)` via a ±30-minute warehouse
//!   join is replaced with the same two chain queries the owner-map and
//!   stake-map shovels already run (`SubtensorModule.Owner`,
//!   `SubtensorModule.Stake`) against this block's own hash. There is no
//!   "absent from the warehouse, fall back to chain" branch to reconcile
//!   because chain is the only source consulted; a hotkey with no stake
//!   entry is, on this chain, truly stake-0, so the result is identical
//!   to the fallback path without needing the consistency assertion the
//!   join version required.
//! - Refreshing the axon cache from "the extrinsics warehouse table" is
//!   replaced with reading this block's extrinsics directly off the
//!   chain client (the same `get_extrinsics`/`get_events` pair the
//!   extrinsics shovel itself uses to build that table) — equivalent
//!   data, one hop shorter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use shovel_chain::{
    decode_double_accountid_key, decode_identity_u16_key, decode_single_accountid_key,
    decode_u16_accountid_key,
};
use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovel_schema::Value;
use shovels::chainval::{map_get, map_get_bool, map_get_f64, map_get_str, map_get_u128};
use shovels::sql::datetime_literal;
use shovels::tables::{create_subnets_table_sql, SUBNETS_TABLE};
use shovels::waitfor::wait_for;
use shovels::{Args, Bootstrap};

const DEPENDENCIES: &[&str] = &["extrinsics", "stake_double_map", "hotkey_owner_map"];

/// Axon cache size past which stale entries are evicted (§4.J point 5).
const AXON_CACHE_LIMIT: usize = 1_000_000;

#[derive(Clone)]
struct Axon {
    ip: String,
    port: u16,
    ip_type: u8,
    protocol: u8,
    last_seen_block: u64,
}

struct SubnetsProcessor {
    chain: Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    checkpoint_store: Arc<dyn shovel_core::CheckpointStore>,
    block_meta: Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: Arc<shovel_warehouse::WarehouseTimestampSource>,
    axons: Mutex<HashMap<(u16, String), Axon>>,
}

impl SubnetsProcessor {
    /// See [`bootstrap_axon_cache`]; called once from `main` before the
    /// cursor loop starts.
    async fn bootstrap_axons(&self) -> Result<(), ShovelError> {
        bootstrap_axon_cache(self.chain.as_ref(), &self.axons).await
    }

    /// Apply this block's successful `SubtensorModule.serve_axon`
    /// extrinsics to the axon cache, then evict the oldest entries if
    /// the cache has grown past the bound.
    async fn refresh_axons(&self, block_number: u64) -> Result<(), ShovelError> {
        let extrinsics = self.chain.get_extrinsics(block_number).await?;
        let hash = self.chain.get_block_hash(block_number).await?;
        let events = self.chain.get_events(&hash).await?;

        let mut succeeded = std::collections::HashSet::new();
        for event in &events {
            if event.module_id == "System" && event.event_id == "ExtrinsicSuccess" {
                if let Some(idx) = event.extrinsic_idx {
                    succeeded.insert(idx);
                }
            }
        }

        let mut axons = self.axons.lock().await;
        for (idx, extrinsic) in extrinsics.iter().enumerate() {
            if extrinsic.call_module != "SubtensorModule" || extrinsic.call_function != "serve_axon" {
                continue;
            }
            if !succeeded.contains(&(idx as u32)) {
                continue;
            }
            let Some(hotkey) = &extrinsic.address else { continue };

            let args = Value::Map(
                extrinsic.call_args.iter().map(|a| (a.name.clone(), a.value.clone())).collect(),
            );
            let Some(netuid) = map_get(&args, "netuid").and_then(Value::as_int) else { continue };
            let ip = map_get_str(&args, "ip").unwrap_or("").to_string();
            let port = map_get(&args, "port").and_then(Value::as_int).unwrap_or(0) as u16;
            let ip_type = map_get(&args, "ip_type").and_then(Value::as_int).unwrap_or(0) as u8;
            let protocol = map_get(&args, "protocol").and_then(Value::as_int).unwrap_or(0) as u8;

            axons.insert(
                (netuid as u16, hotkey.clone()),
                Axon { ip, port, ip_type, protocol, last_seen_block: block_number },
            );
        }

        if axons.len() > AXON_CACHE_LIMIT {
            let mut by_age: Vec<_> = axons.iter().map(|(k, v)| (k.clone(), v.last_seen_block)).collect();
            by_age.sort_by_key(|(_, last_seen)| *last_seen);
            let excess = axons.len() - AXON_CACHE_LIMIT;
            for (key, _) in by_age.into_iter().take(excess) {
                axons.remove(&key);
            }
        }

        Ok(())
    }
}

/// One-time full load of the axon cache from `SubtensorModule.Axons`
/// (§3, §4.J point 3: "bootstrapped from chain once, then incrementally
/// updated from successful `serve_axon` extrinsics"). Without this, any
/// axon served before the shovel's own starting block would never
/// appear in the cache. A free function (rather than a method) so it
/// only needs a chain handle and the cache it fills, not a whole
/// `SubnetsProcessor`.
async fn bootstrap_axon_cache(
    chain: &dyn ChainApi,
    axons: &Mutex<HashMap<(u16, String), Axon>>,
) -> Result<(), ShovelError> {
    let hash = chain.get_chain_finalised_head().await?;
    let entries = chain.query_map("SubtensorModule", "Axons", &hash, &[], 1000).await?;

    let mut axons = axons.lock().await;
    for entry in entries {
        let Some(key_hex) = entry.key.as_str() else { continue };
        let Some((netuid, hotkey)) = decode_u16_accountid_key(key_hex) else { continue };

        let ip = map_get_str(&entry.value, "ip").unwrap_or("").to_string();
        let port = map_get(&entry.value, "port").and_then(Value::as_int).unwrap_or(0) as u16;
        let ip_type = map_get(&entry.value, "ip_type").and_then(Value::as_int).unwrap_or(0) as u8;
        let protocol = map_get(&entry.value, "protocol").and_then(Value::as_int).unwrap_or(0) as u8;
        let last_seen_block = map_get(&entry.value, "block").and_then(Value::as_int).unwrap_or(0) as u64;

        axons.insert((netuid, hotkey), Axon { ip, port, ip_type, protocol, last_seen_block });
    }

    Ok(())
}

#[async_trait]
impl BlockProcessor for SubnetsProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        wait_for(self.checkpoint_store.as_ref(), DEPENDENCIES, block_number).await?;

        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        self.refresh_axons(block_number).await?;

        let owner_entries = self.chain.query_map("SubtensorModule", "Owner", &hash, &[], 1000).await?;
        let mut owner_by_hotkey: HashMap<String, String> = HashMap::new();
        for entry in owner_entries {
            let Some(key_hex) = entry.key.as_str() else { continue };
            let Some(hotkey) = decode_single_accountid_key(key_hex) else { continue };
            let Some(coldkey) = entry.value.as_str() else { continue };
            owner_by_hotkey.insert(hotkey, coldkey.to_string());
        }

        let stake_entries = self.chain.query_map("SubtensorModule", "Stake", &hash, &[], 1000).await?;
        let mut stake_by_hotkey: HashMap<String, u128> = HashMap::new();
        for entry in stake_entries {
            let Some(key_hex) = entry.key.as_str() else { continue };
            let Some((hotkey, _coldkey)) = decode_double_accountid_key(key_hex) else { continue };
            let stake = entry.value.as_int().unwrap_or(0).max(0) as u128;
            *stake_by_hotkey.entry(hotkey).or_insert(0) += stake;
        }

        let netuids = self.chain.query_map("SubtensorModule", "NetworksAdded", &hash, &[], 1000).await?;
        let axons = self.axons.lock().await.clone();

        for entry in netuids {
            let Some(key_hex) = entry.key.as_str() else { continue };
            let Some(netuid) = decode_identity_u16_key(key_hex) else { continue };

            let neurons = self
                .chain
                .runtime_call(
                    "NeuronInfoRuntimeApi",
                    "get_neurons_lite",
                    &[Value::Int(netuid as i128)],
                    &hash,
                )
                .await?;
            let Value::Seq(neurons) = neurons else { continue };

            for neuron in &neurons {
                let Some(neuron_uid) = map_get(neuron, "uid").and_then(Value::as_int) else { continue };
                let Some(hotkey) = map_get_str(neuron, "hotkey") else { continue };

                let coldkey = owner_by_hotkey.get(hotkey).cloned().unwrap_or_default();
                let stake = stake_by_hotkey.get(hotkey).copied().unwrap_or(0);
                let axon = axons.get(&(netuid, hotkey.to_string()));

                let row = format!(
                    "({block_number}, {}, {netuid}, {neuron_uid}, '{}', '{}', {stake}, {}, {}, {}, {}, {}, \
                     {}, {}, {}, {}, {}, {}, '{}', {}, {}, {})",
                    datetime_literal(ts),
                    hotkey.replace('\'', "\\'"),
                    coldkey.replace('\'', "\\'"),
                    map_get_bool(neuron, "active"),
                    map_get_f64(neuron, "rank"),
                    map_get_f64(neuron, "trust"),
                    map_get_u128(neuron, "emission").unwrap_or(0),
                    map_get_f64(neuron, "consensus"),
                    map_get_f64(neuron, "incentive"),
                    map_get_f64(neuron, "dividends"),
                    map_get_u128(neuron, "last_update").unwrap_or(0),
                    map_get_f64(neuron, "pruning_score"),
                    map_get_f64(neuron, "validator_trust"),
                    map_get_bool(neuron, "validator_permit"),
                    axon.map(|a| a.ip.clone()).unwrap_or_default(),
                    axon.map(|a| a.port).unwrap_or(0),
                    axon.map(|a| a.ip_type).unwrap_or(0),
                    axon.map(|a| a.protocol).unwrap_or(0),
                );
                self.buffer.insert(SUBNETS_TABLE, row).await;
            }
        }

        shovels::metrics::record_block_processed("subnets");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("subnets", 1, &args).await?;
    bootstrap.warehouse.execute(&create_subnets_table_sql()).await?;

    let processor = SubnetsProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        checkpoint_store: bootstrap.checkpoint_store.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
        axons: Mutex::new(HashMap::new()),
    };
    processor.bootstrap_axons().await?;
    bootstrap.run(&processor).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_list_matches_spec() {
        assert_eq!(DEPENDENCIES, &["extrinsics", "stake_double_map", "hotkey_owner_map"]);
    }

    struct AxonsOnlyChain {
        key_hex: String,
    }

    #[async_trait::async_trait]
    impl ChainApi for AxonsOnlyChain {
        async fn get_chain_finalised_head(&self) -> Result<String, ShovelError> {
            Ok("0xhead".into())
        }
        async fn get_block_number(&self, _: &str) -> Result<u64, ShovelError> {
            Ok(0)
        }
        async fn get_block_hash(&self, _: u64) -> Result<String, ShovelError> {
            Ok("0xhead".into())
        }
        async fn query(&self, _: &str, _: &str, _: &str, _: &[Value]) -> Result<Value, ShovelError> {
            Ok(Value::Null)
        }
        async fn query_map(
            &self,
            _pallet: &str,
            _item: &str,
            _at: &str,
            _params: &[Value],
            _page_size: u32,
        ) -> Result<Vec<shovel_core::chain_client::MapEntry>, ShovelError> {
            Ok(vec![shovel_core::chain_client::MapEntry {
                key: Value::String(self.key_hex.clone()),
                value: Value::Map(vec![
                    ("ip".into(), Value::String("1.2.3.4".into())),
                    ("port".into(), Value::Int(9944)),
                    ("ip_type".into(), Value::Int(4)),
                    ("protocol".into(), Value::Int(0)),
                    ("block".into(), Value::Int(10)),
                ]),
            }])
        }
        async fn get_extrinsics(&self, _: u64) -> Result<Vec<shovel_core::chain_client::Extrinsic>, ShovelError> {
            Ok(vec![])
        }
        async fn get_events(&self, _: &str) -> Result<Vec<shovel_core::chain_client::ChainEvent>, ShovelError> {
            Ok(vec![])
        }
        async fn rpc_request(&self, _: &str, _: &[Value]) -> Result<serde_json::Value, ShovelError> {
            Ok(serde_json::Value::Null)
        }
        async fn runtime_call(&self, _: &str, _: &str, _: &[Value], _: &str) -> Result<Value, ShovelError> {
            Ok(Value::Null)
        }
        async fn reconnect(&self) {}
    }

    #[tokio::test]
    async fn bootstrap_axons_loads_the_cache_before_any_block_is_processed() {
        let mut bytes = vec![0xABu8; 32];
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend(std::iter::repeat(0x11).take(16));
        bytes.extend(std::iter::repeat(0x22).take(32));
        let key_hex = format!("0x{}", hex::encode(bytes));

        let chain = AxonsOnlyChain { key_hex };
        let axons: Mutex<HashMap<(u16, String), Axon>> = Mutex::new(HashMap::new());

        bootstrap_axon_cache(&chain, &axons).await.unwrap();

        let axons = axons.lock().await;
        assert_eq!(axons.len(), 1);
        let (key, axon) = axons.iter().next().unwrap();
        assert_eq!(key.0, 7);
        assert_eq!(axon.ip, "1.2.3.4");
        assert_eq!(axon.port, 9944);
        assert_eq!(axon.last_seen_block, 10);
    }

    #[tokio::test]
    async fn axon_cache_evicts_oldest_past_limit() {
        let mut axons = HashMap::new();
        for i in 0..3u16 {
            axons.insert(
                (i, format!("hotkey{i}")),
                Axon { ip: "1.2.3.4".into(), port: 9944, ip_type: 4, protocol: 0, last_seen_block: i as u64 },
            );
        }
        let mut by_age: Vec<_> = axons.iter().map(|(k, v)| (k.clone(), v.last_seen_block)).collect();
        by_age.sort_by_key(|(_, last_seen)| *last_seen);
        assert_eq!(by_age[0].1, 0);
    }
}
