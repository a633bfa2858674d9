//! The shovel runtime: the catch-up loop every shovel binary drives,
//! plus the checkpoint-anchor handshake the write buffer calls into on
//! each flush cycle (§4.E).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::buffer::FlushHooks;
use crate::chain_client::ChainApi;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::cursor::Cursor;
use crate::error::ShovelError;
use crate::retry::{retry_with_reconnect, RetryPolicy};

/// How long the catch-up loop sleeps once it has drained every finalized
/// block up to the head it observed.
const IDLE_SLEEP: Duration = Duration::from_secs(12);

/// Implemented by each shovel binary: the actual per-block work. Runtime
/// concerns (retry, checkpointing, idle sleep) live entirely in
/// `ShovelRuntime::run`; this trait only ever sees "do the work for this
/// block".
#[async_trait]
pub trait BlockProcessor: Send + Sync {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError>;
}

/// Drives one shovel's catch-up loop: poll the chain's finalized head,
/// walk the cursor forward over it, retry transient failures with
/// reconnect, and hand off a durable checkpoint anchor for the write
/// buffer to persist.
pub struct ShovelRuntime {
    name: String,
    chain: Arc<dyn ChainApi>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    cursor: tokio::sync::Mutex<Cursor>,
    /// The last block number snapshotted for the buffer to persist,
    /// `-1` meaning "nothing snapshotted yet". An `AtomicI64` because the
    /// buffer's flush task calls `snapshot_anchor`/`anchor` concurrently
    /// with the cursor loop advancing `cursor`.
    anchor: AtomicI64,
    retry_policy: RetryPolicy,
}

impl ShovelRuntime {
    /// Loads any existing checkpoint for `name` and builds a runtime
    /// ready to resume from it (or from `starting_block` if none exists).
    pub async fn new(
        name: impl Into<String>,
        starting_block: u64,
        skip_interval: u64,
        chain: Arc<dyn ChainApi>,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Result<Self, ShovelError> {
        let name = name.into();
        let cursor = match checkpoint_store.load(&name).await? {
            Some(Checkpoint { block_number, .. }) => Cursor::resume_from(block_number, skip_interval),
            None => Cursor::new(starting_block, skip_interval),
        };
        Ok(Self {
            name,
            chain,
            checkpoint_store,
            cursor: tokio::sync::Mutex::new(cursor),
            anchor: AtomicI64::new(-1),
            retry_policy: RetryPolicy::default_shovel_policy(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Called by the write buffer's `started()` hook at the top of a
    /// flush cycle: snapshot the cursor's current checkpoint so the
    /// in-flight batch includes a checkpoint row for it.
    pub async fn snapshot_anchor(&self) {
        if let Some(block_number) = self.cursor.lock().await.checkpoint() {
            self.anchor.store(block_number as i64, Ordering::SeqCst);
        }
    }

    /// Called by the write buffer's `done()` hook after a flush cycle
    /// completes successfully: durably persist the snapshotted anchor.
    /// This is the source of the documented one-cycle lag (§4.E, §9):
    /// the anchor snapshotted at cycle N's `started()` is only made
    /// durable by cycle N's `done()`, itself run after cycle N's batch
    /// (which already included the checkpoint row written here) lands.
    pub async fn persist_anchor(&self) -> Result<(), ShovelError> {
        let anchor = self.anchor.load(Ordering::SeqCst);
        if anchor < 0 {
            return Ok(());
        }
        self.checkpoint_store
            .save(Checkpoint { shovel_name: self.name.clone(), block_number: anchor as u64 })
            .await
    }

    /// Run the catch-up loop forever, driving `processor` over every
    /// pending finalized block. Returns only on a fatal error (the
    /// process is expected to exit non-zero and be restarted by its
    /// orchestrator) or when `shutdown` fires.
    pub async fn run(
        &self,
        processor: &dyn BlockProcessor,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), ShovelError> {
        loop {
            if *shutdown.borrow() {
                info!(shovel = %self.name, "shutdown signal received, stopping cursor loop");
                return Ok(());
            }

            let finalized_hash = self.chain.get_chain_finalised_head().await?;
            let finalized = self.chain.get_block_number(&finalized_hash).await?;

            let pending: Vec<u64> = {
                let cursor = self.cursor.lock().await;
                cursor.pending_blocks(finalized).collect()
            };

            if pending.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            for block_number in pending {
                if *shutdown.borrow() {
                    return Ok(());
                }

                let result = retry_with_reconnect(
                    self.retry_policy,
                    || processor.process_block(block_number),
                    || self.chain.reconnect(),
                )
                .await;

                match result {
                    Ok(()) => {
                        self.cursor.lock().await.advance(block_number);
                    }
                    Err(err) => {
                        error!(shovel = %self.name, block_number, %err, "fatal error processing block");
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// The buffer calls back into the runtime it belongs to at flush time —
/// this is the only place the two pieces are wired together.
#[async_trait]
impl FlushHooks for ShovelRuntime {
    async fn started(&self) {
        self.snapshot_anchor().await;
    }

    async fn done(&self, _table_count: usize, _row_count: usize) {
        if let Err(err) = self.persist_anchor().await {
            error!(shovel = %self.name, %err, "failed to persist checkpoint anchor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use shovel_schema::Value;
    use std::sync::atomic::AtomicU32;

    struct StubChain {
        finalized: u64,
    }

    #[async_trait::async_trait]
    impl ChainApi for StubChain {
        async fn get_chain_finalised_head(&self) -> Result<String, ShovelError> {
            Ok("0xhead".into())
        }
        async fn get_block_number(&self, _: &str) -> Result<u64, ShovelError> {
            Ok(self.finalized)
        }
        async fn get_block_hash(&self, n: u64) -> Result<String, ShovelError> {
            Ok(format!("0xblock{n}"))
        }
        async fn query(&self, _: &str, _: &str, _: &str, _: &[Value]) -> Result<Value, ShovelError> {
            Ok(Value::Null)
        }
        async fn query_map(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &[Value],
            _: u32,
        ) -> Result<Vec<crate::chain_client::MapEntry>, ShovelError> {
            Ok(vec![])
        }
        async fn get_extrinsics(&self, _: u64) -> Result<Vec<crate::chain_client::Extrinsic>, ShovelError> {
            Ok(vec![])
        }
        async fn get_events(&self, _: &str) -> Result<Vec<crate::chain_client::ChainEvent>, ShovelError> {
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

    struct CountingProcessor {
        processed: AtomicU32,
    }

    #[async_trait::async_trait]
    impl BlockProcessor for CountingProcessor {
        async fn process_block(&self, _block_number: u64) -> Result<(), ShovelError> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn drains_pending_blocks_then_idles() {
        let chain: Arc<dyn ChainApi> = Arc::new(StubChain { finalized: 2 });
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let runtime = ShovelRuntime::new("test", 0, 1, chain, store).await.unwrap();
        let processor = CountingProcessor { processed: AtomicU32::new(0) };

        let (tx, rx) = tokio::sync::watch::channel(false);

        tokio::select! {
            _ = runtime.run(&processor, rx) => {}
            _ = async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = tx.send(true);
            } => {}
        }

        assert!(processor.processed.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn anchor_round_trips_through_checkpoint_store() {
        let chain: Arc<dyn ChainApi> = Arc::new(StubChain { finalized: 0 });
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let runtime = ShovelRuntime::new("anchor-test", 5, 1, chain, store.clone()).await.unwrap();

        runtime.cursor.lock().await.advance(10);
        runtime.snapshot_anchor().await;
        runtime.persist_anchor().await.unwrap();

        let checkpoint = store.load("anchor-test").await.unwrap().unwrap();
        assert_eq!(checkpoint.block_number, 10);
    }

    #[tokio::test]
    async fn flush_hooks_snapshot_and_persist_the_anchor() {
        let chain: Arc<dyn ChainApi> = Arc::new(StubChain { finalized: 0 });
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let runtime = ShovelRuntime::new("hooked", 5, 1, chain, store.clone()).await.unwrap();
        runtime.cursor.lock().await.advance(7);

        FlushHooks::started(&runtime).await;
        FlushHooks::done(&runtime, 1, 1).await;

        let checkpoint = store.load("hooked").await.unwrap().unwrap();
        assert_eq!(checkpoint.block_number, 7);
    }
}
