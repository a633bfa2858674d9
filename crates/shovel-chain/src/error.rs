//! Chain-client error types, and the boundary that turns them into the
//! two-variant [`ShovelError`](shovel_core::error::ShovelError) taxonomy
//! every shovel is written against.

use thiserror::Error;

use shovel_core::error::ShovelError;

use crate::request::JsonRpcError;

/// Errors that can occur talking to the node.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The connection could not be established, or was lost mid-call.
    /// Always mapped to `ShovelError::Database` — the shovel runtime's
    /// retry middleware reconnects and retries on this variant.
    #[error("connection error: {0}")]
    Connection(String),

    /// JSON-RPC protocol-level error returned by the node itself (bad
    /// params, unknown method, execution trap). Not a transport failure —
    /// retrying it unchanged would just fail the same way again.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// A response the client could not decode (unexpected shape, SCALE
    /// decode failure, metadata mismatch).
    #[error("decode error: {0}")]
    Decode(String),

    /// Request timed out.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl From<ChainError> for ShovelError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Connection(_) | ChainError::Timeout { .. } => {
                ShovelError::database(err.to_string())
            }
            ChainError::Rpc(_) | ChainError::Decode(_) => ShovelError::processing(err.to_string()),
        }
    }
}
