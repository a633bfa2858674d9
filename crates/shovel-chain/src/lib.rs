//! shovel-chain — the Substrate chain client every shovel is built against.
//!
//! A single connection per worker, created lazily on first use, backed by
//! a `subxt` dynamic client for storage/extrinsic/event access and a bare
//! `jsonrpsee` HTTP client for the one raw RPC call (`state_getReadProof`)
//! that has no higher-level wrapper. `reconnect` drops the held handle so
//! the next call re-establishes it — the shovel runtime's retry
//! middleware is the only caller.

pub mod error;
pub mod keys;
pub mod request;
pub mod substrate;

pub use error::ChainError;
pub use keys::{decode_double_accountid_key, decode_identity_u16_key, decode_single_accountid_key};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId, RpcParam};
pub use substrate::SubstrateChainClient;
