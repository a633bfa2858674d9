//! The chain client contract every shovel programs against.
//!
//! This trait names the narrow slice of Substrate JSON-RPC a shovel
//! actually needs (§6). The concrete implementation — a `subxt` dynamic
//! client plus a `jsonrpsee` legacy client for the one raw RPC call this
//! crate still needs — lives in `shovel-chain`; that crate is out of
//! scope here by design (§1: the chain transport itself is not part of
//! this crate).

use async_trait::async_trait;
use shovel_schema::Value;

use crate::error::ShovelError;

/// One decoded extrinsic, shaped the way `get_extrinsics` hands it back.
#[derive(Debug, Clone)]
pub struct Extrinsic {
    pub address: Option<String>,
    pub nonce: Option<u64>,
    pub tip: Option<u64>,
    pub call_module: String,
    pub call_function: String,
    pub call_args: Vec<CallArg>,
}

/// One named, typed argument to an extrinsic's call.
#[derive(Debug, Clone)]
pub struct CallArg {
    pub name: String,
    pub declared_type: String,
    pub value: Value,
}

/// One decoded chain event, shaped the way a `System.Events` query item
/// hands it back.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub extrinsic_idx: Option<u32>,
    pub module_id: String,
    pub event_id: String,
    pub attributes: Value,
}

/// A single key/value pair from a `query_map` page.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

/// The opaque result of `state_getReadProof`: the trie node hashes making
/// up the proof. Callers (e.g. the owner-map shovel) compare two proofs
/// for set-equality via [`proof_changed`] to decide whether a prefix's
/// contents changed between blocks, without decoding the proof itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadProof {
    pub nodes: Vec<String>,
}

/// `true` if `a` and `b` carry different sets of proof nodes, ignoring
/// order — the node list a full node returns for an unchanged prefix is
/// not guaranteed to repeat in the same order.
pub fn proof_changed(a: &ReadProof, b: &ReadProof) -> bool {
    use std::collections::HashSet;
    let a_set: HashSet<&str> = a.nodes.iter().map(String::as_str).collect();
    let b_set: HashSet<&str> = b.nodes.iter().map(String::as_str).collect();
    a_set != b_set
}

/// The narrow chain-RPC surface a shovel is built against.
///
/// A single connection is held per worker and created lazily; `reconnect`
/// drops it so the next call re-establishes it. The shovel runtime's
/// retry middleware (`retry::retry_with_reconnect`) is the only caller of
/// `reconnect` — individual shovels never call it directly.
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Block hash of the chain's current finalized head.
    async fn get_chain_finalised_head(&self) -> Result<String, ShovelError>;

    /// Block number for a given block hash.
    async fn get_block_number(&self, block_hash: &str) -> Result<u64, ShovelError>;

    /// Block hash for a given block number.
    async fn get_block_hash(&self, block_number: u64) -> Result<String, ShovelError>;

    /// A single scale-decoded storage item.
    async fn query(
        &self,
        pallet: &str,
        item: &str,
        at: &str,
        params: &[Value],
    ) -> Result<Value, ShovelError>;

    /// A full page of a storage map, already decoded.
    async fn query_map(
        &self,
        pallet: &str,
        item: &str,
        at: &str,
        params: &[Value],
        page_size: u32,
    ) -> Result<Vec<MapEntry>, ShovelError>;

    /// Every extrinsic in a block, decoded.
    async fn get_extrinsics(&self, block_number: u64) -> Result<Vec<Extrinsic>, ShovelError>;

    /// Every event in a block, decoded, in emission order.
    async fn get_events(&self, at: &str) -> Result<Vec<ChainEvent>, ShovelError>;

    /// A raw JSON-RPC call, used only for `state_getReadProof` — there is
    /// no higher-level wrapper for Merkle proofs in the Substrate client
    /// libraries this trait is meant to be backed by.
    async fn rpc_request(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<serde_json::Value, ShovelError>;

    /// A runtime API call (used for subnet/delegate info not exposed
    /// through plain storage queries).
    async fn runtime_call(
        &self,
        api: &str,
        method: &str,
        params: &[Value],
        block_hash: &str,
    ) -> Result<Value, ShovelError>;

    /// Drop the held connection so the next call re-establishes it.
    async fn reconnect(&self);
}

/// Convenience built on top of `rpc_request`: fetch and interpret a
/// `state_getReadProof` result as the flat node list callers diff.
pub async fn get_read_proof(
    chain: &dyn ChainApi,
    prefix_hex: &str,
    block_hash: &str,
) -> Result<ReadProof, ShovelError> {
    let params = vec![
        Value::Seq(vec![Value::String(prefix_hex.to_string())]),
        Value::String(block_hash.to_string()),
    ];
    let response = chain.rpc_request("state_getReadProof", &params).await?;
    let nodes = response
        .get("result")
        .and_then(|r| r.get("proof"))
        .and_then(|p| p.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Ok(ReadProof { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_changed_ignores_node_order() {
        let a = ReadProof { nodes: vec!["0x1".into(), "0x2".into()] };
        let b = ReadProof { nodes: vec!["0x2".into(), "0x1".into()] };
        assert!(!proof_changed(&a, &b));

        let c = ReadProof { nodes: vec!["0x1".into(), "0x3".into()] };
        assert!(proof_changed(&a, &c));
    }
}
