//! `TimestampWindowSource` backed by `shovel_block_timestamps` — the
//! block-timestamp shovel's own output table doubles as the cache source
//! every other shovel's `BlockMetadataCache` reads from (§4.C).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use shovel_core::block_meta::TimestampWindowSource;
use shovel_core::error::ShovelError;

use crate::client::ClickhouseWarehouse;
use crate::ddl::{create_block_timestamps_table_sql, BLOCK_TIMESTAMPS_TABLE};

pub struct WarehouseTimestampSource {
    client: Arc<ClickhouseWarehouse>,
}

impl WarehouseTimestampSource {
    pub async fn new(client: Arc<ClickhouseWarehouse>) -> Result<Self, ShovelError> {
        use shovel_core::warehouse_client::WarehouseClient;
        client.execute(&create_block_timestamps_table_sql()).await?;
        Ok(Self { client })
    }
}

#[derive(clickhouse::Row, Deserialize)]
struct TimestampRow {
    block_number: u64,
    timestamp: u32,
}

#[async_trait]
impl TimestampWindowSource for WarehouseTimestampSource {
    async fn load_window(
        &self,
        window_start: u64,
        window_end: u64,
    ) -> Result<Vec<(u64, DateTime<Utc>)>, ShovelError> {
        let sql = format!(
            "SELECT block_number, toUnixTimestamp(timestamp) AS timestamp \
             FROM {BLOCK_TIMESTAMPS_TABLE} FINAL \
             WHERE block_number >= {window_start} AND block_number <= {window_end}"
        );
        let rows: Vec<TimestampRow> = self
            .client
            .raw()
            .query(&sql)
            .fetch_all()
            .await
            .map_err(|err| ShovelError::database(format!("timestamp window load failed: {err}")))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                DateTime::from_timestamp(row.timestamp as i64, 0).map(|ts| (row.block_number, ts))
            })
            .collect())
    }
}
