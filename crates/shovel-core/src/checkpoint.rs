//! Checkpoint-as-data: a shovel's progress lives in the warehouse itself,
//! as a row in `shovel_checkpoints`, not in a side transactional store.
//!
//! The runtime (`runtime.rs`) decides *when* to read and write a
//! checkpoint; this module only defines the shape of that data and the
//! storage trait it's read/written through.

use async_trait::async_trait;

use crate::error::ShovelError;

/// A shovel's durable progress marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub shovel_name: String,
    pub block_number: u64,
}

/// Storage for checkpoint rows. The production implementation
/// (`shovel_warehouse::checkpoint::WarehouseCheckpointStore`) reads/writes
/// the `shovel_checkpoints` table through the same `WarehouseClient` used
/// for everything else — there is no separate transactional store.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest known checkpoint for `shovel_name`, `None` if never saved.
    async fn load(&self, shovel_name: &str) -> Result<Option<Checkpoint>, ShovelError>;

    /// Upsert the checkpoint for `shovel_name`. The underlying table uses
    /// a replacing-merge engine, so repeated saves of the same or
    /// decreasing block numbers are safe, if wasteful.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ShovelError>;
}

/// In-memory checkpoint store, used in unit tests and for local dry runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: std::sync::Mutex<std::collections::HashMap<String, u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, shovel_name: &str) -> Result<Option<Checkpoint>, ShovelError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(shovel_name)
            .map(|&block_number| Checkpoint {
                shovel_name: shovel_name.to_string(),
                block_number,
            }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ShovelError> {
        self.data
            .lock()
            .unwrap()
            .insert(checkpoint.shovel_name, checkpoint.block_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("events").await.unwrap().is_none());

        store
            .save(Checkpoint {
                shovel_name: "events".into(),
                block_number: 1000,
            })
            .await
            .unwrap();

        let cp = store.load("events").await.unwrap().unwrap();
        assert_eq!(cp.block_number, 1000);
    }

    #[tokio::test]
    async fn later_save_overwrites_earlier() {
        let store = MemoryCheckpointStore::new();
        store
            .save(Checkpoint { shovel_name: "events".into(), block_number: 10 })
            .await
            .unwrap();
        store
            .save(Checkpoint { shovel_name: "events".into(), block_number: 20 })
            .await
            .unwrap();
        assert_eq!(store.load("events").await.unwrap().unwrap().block_number, 20);
    }
}
