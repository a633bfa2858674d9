//! shovel-core — the shared substrate every shovel binary is built on.
//!
//! # Architecture
//!
//! ```text
//! ShovelRuntime (cursor loop)
//!   ├── Cursor              (monotonic per-shovel block pointer)
//!   ├── CheckpointStore      (checkpoint-as-data: shovel_checkpoints)
//!   ├── ChainApi             (narrow chain-RPC surface, impl in shovel-chain)
//!   ├── WarehouseClient      (execute/table_exists, impl in shovel-warehouse)
//!   ├── WriteBuffer           (batched async flush, started/done hooks)
//!   └── BlockMetadataCache    (block number -> (timestamp, hash))
//! ```
//!
//! Dynamic schema derivation (column names/types from runtime-typed
//! payloads, versioned table naming) lives in `shovel-schema`; this crate
//! only owns the cursor/checkpoint/buffer/runtime substrate.

pub mod block_meta;
pub mod buffer;
pub mod chain_client;
pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod error;
pub mod retry;
pub mod runtime;
pub mod warehouse_client;

pub use block_meta::{BlockMetadataCache, TimestampWindowSource};
pub use buffer::{FlushHooks, NoHooks, WriteBuffer};
pub use chain_client::{ChainApi, ChainEvent, Extrinsic, MapEntry, ReadProof};
pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use config::Settings;
pub use cursor::Cursor;
pub use error::ShovelError;
pub use retry::{retry_with_reconnect, RetryPolicy};
pub use runtime::{BlockProcessor, ShovelRuntime};
pub use warehouse_client::{escape_identifier, WarehouseClient};
