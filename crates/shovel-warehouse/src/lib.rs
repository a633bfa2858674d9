//! shovel-warehouse — the ClickHouse-compatible warehouse client (§4.A).
//!
//! This crate is the only place that talks to the database. Every other
//! crate programs against the `WarehouseClient`/`CheckpointStore`/
//! `TimestampWindowSource` traits defined in `shovel-core`; this crate
//! supplies their concrete implementations plus the dynamic-schema table
//! resolver (§4.F) that needs a live `DESCRIBE TABLE` round trip.

pub mod checkpoint;
pub mod client;
pub mod ddl;
pub mod resolver;
pub mod timestamps;

pub use checkpoint::WarehouseCheckpointStore;
pub use client::{ClickhouseOptions, ClickhouseWarehouse};
pub use resolver::TableResolver;
pub use timestamps::WarehouseTimestampSource;
