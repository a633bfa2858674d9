//! `CheckpointStore` backed by the `shovel_checkpoints` table — there is
//! no separate transactional store, checkpoints are data (§3, §9).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use shovel_core::checkpoint::{Checkpoint, CheckpointStore};
use shovel_core::error::ShovelError;

use crate::client::ClickhouseWarehouse;
use crate::ddl::{create_checkpoints_table_sql, CHECKPOINTS_TABLE};

pub struct WarehouseCheckpointStore {
    client: Arc<ClickhouseWarehouse>,
}

impl WarehouseCheckpointStore {
    /// Ensure `shovel_checkpoints` exists, then return a store reading
    /// and writing through it.
    pub async fn new(client: Arc<ClickhouseWarehouse>) -> Result<Self, ShovelError> {
        use shovel_core::warehouse_client::WarehouseClient;
        client.execute(&create_checkpoints_table_sql()).await?;
        Ok(Self { client })
    }
}

#[derive(clickhouse::Row, Deserialize)]
struct CheckpointRow {
    block_number: u64,
}

#[async_trait]
impl CheckpointStore for WarehouseCheckpointStore {
    async fn load(&self, shovel_name: &str) -> Result<Option<Checkpoint>, ShovelError> {
        // `FINAL` forces the replacing-merge collapse at query time
        // rather than trusting a background merge has already happened
        // (the checkpoint table may have several superseded rows for
        // `shovel_name` still unmerged).
        let sql = format!(
            "SELECT block_number FROM {CHECKPOINTS_TABLE} FINAL WHERE shovel_name = '{}' LIMIT 1",
            escape(shovel_name)
        );
        let rows: Vec<CheckpointRow> = self
            .client
            .raw()
            .query(&sql)
            .fetch_all()
            .await
            .map_err(|err| ShovelError::database(format!("checkpoint load failed: {err}")))?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| Checkpoint { shovel_name: shovel_name.to_string(), block_number: row.block_number }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ShovelError> {
        use shovel_core::warehouse_client::WarehouseClient;
        let sql = format!(
            "INSERT INTO {CHECKPOINTS_TABLE} (shovel_name, block_number) VALUES ('{}', {})",
            escape(&checkpoint.shovel_name),
            checkpoint.block_number
        );
        self.client.execute(&sql).await
    }
}

fn escape(s: &str) -> String {
    s.replace('\'', "\\'")
}
