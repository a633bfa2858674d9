//! Shared process bootstrap for every shovel binary: settings, tracing,
//! the connected chain/warehouse handles, the write buffer and its flush
//! loop, and graceful shutdown wiring. Each `src/bin/*.rs` is a thin
//! `BlockProcessor` plus a `main()` that calls [`bootstrap::Bootstrap::init`].

pub mod bootstrap;
pub mod chainval;
pub mod cmc;
pub mod metrics;
pub mod sql;
pub mod tables;
pub mod waitfor;

pub use bootstrap::{Args, Bootstrap};
pub use cmc::CmcClient;
