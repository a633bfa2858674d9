//! The write buffer (§4.B): a mutex-guarded `table -> rows` map drained on
//! a timer by a background flush task, with per-table bisection on
//! partial failure and a `started`/`done` hook pair that is how the
//! runtime's checkpoint-anchor handshake (`runtime.rs`) gets wired in.
//!
//! There is deliberately no cross-table ordering guarantee and no global
//! singleton: one `WriteBuffer` is constructed per shovel process and
//! threaded into whatever needs to push rows, matching §9's guidance to
//! express the original's global mutable buffer as an explicit value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::ShovelError;
use crate::warehouse_client::WarehouseClient;

/// A single pre-formatted row: one SQL `VALUES (...)` tuple, already
/// escaped/literal-formatted by the caller (the dynamic-schema engine for
/// events/extrinsics, or a shovel's own row-builder for fixed-schema
/// tables).
pub type Row = String;

/// A table's queue is backpressured once it holds this many unflushed
/// rows (§4.B, §8 back-pressure property).
pub const BACKPRESSURE_LIMIT: usize = 1_000_000;

const BACKPRESSURE_SLEEP: Duration = Duration::from_secs(1);

/// Hooks the runtime supplies so the buffer can drive the checkpoint
/// handshake without owning any runtime state itself.
#[async_trait::async_trait]
pub trait FlushHooks: Send + Sync {
    /// Called under the buffer's lock at the top of a flush cycle, before
    /// the batch is swapped out — the runtime snapshots its current
    /// checkpoint here so the *next* batch (this one, since the snapshot
    /// call itself doesn't buffer a row until the caller does) includes
    /// a checkpoint row for it. See `runtime::ShovelRuntime::snapshot_anchor`.
    async fn started(&self);

    /// Called after a flush cycle completes successfully, with the
    /// number of tables and rows flushed.
    async fn done(&self, table_count: usize, row_count: usize);
}

/// No-op hooks, for buffers that don't need the checkpoint handshake
/// (tests, the tx-submit helper).
pub struct NoHooks;

#[async_trait::async_trait]
impl FlushHooks for NoHooks {
    async fn started(&self) {}
    async fn done(&self, _table_count: usize, _row_count: usize) {}
}

struct Inner {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

/// The shared buffer. Cheaply cloneable (`Arc` inside) so both the
/// cursor-loop task (which calls `insert`) and the flush task (which owns
/// the `flush_loop` future) can hold a handle.
#[derive(Clone)]
pub struct WriteBuffer {
    inner: Arc<Inner>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner { tables: Mutex::new(HashMap::new()) }) }
    }

    /// Push `row` onto `table`'s queue. Blocks (sleeping 1s between
    /// checks) while the queue already holds >= [`BACKPRESSURE_LIMIT`]
    /// rows; never drops a row.
    pub async fn insert(&self, table: impl Into<String>, row: Row) {
        let table = table.into();
        loop {
            let mut tables = self.inner.tables.lock().await;
            let queue = tables.entry(table.clone()).or_default();
            if queue.len() < BACKPRESSURE_LIMIT {
                queue.push(row);
                return;
            }
            drop(tables);
            warn!(table = %table, "write buffer backpressure, sleeping");
            tokio::time::sleep(BACKPRESSURE_SLEEP).await;
        }
    }

    /// Push many rows onto `table`'s queue at once (used by shovels that
    /// emit a full snapshot per block, e.g. the stake-map shovel), under
    /// the same backpressure rule as `insert`.
    pub async fn insert_many(&self, table: impl Into<String>, rows: impl IntoIterator<Item = Row>) {
        let table = table.into();
        for row in rows {
            self.insert(table.clone(), row).await;
        }
    }

    /// Swap the entire map out for a fresh, empty one and return what was
    /// swapped out. Used by `flush_loop`; exposed separately so tests can
    /// drive a single cycle deterministically.
    async fn swap(&self) -> HashMap<String, Vec<Row>> {
        let mut tables = self.inner.tables.lock().await;
        std::mem::take(&mut *tables)
    }

    /// Run one flush cycle against `warehouse`: call `hooks.started()`,
    /// swap the buffer, issue one INSERT per table (bisecting on
    /// failure), then call `hooks.done()`. Returns `Err` (and leaves the
    /// shovel to exit fatally, per §7) the first time bisection isolates
    /// an unrecoverable singleton row.
    pub async fn flush_once(
        &self,
        warehouse: &dyn WarehouseClient,
        hooks: &dyn FlushHooks,
    ) -> Result<(), ShovelError> {
        hooks.started().await;
        let batch = self.swap().await;
        if batch.is_empty() {
            hooks.done(0, 0).await;
            return Ok(());
        }

        let table_count = batch.len();
        let mut row_count = 0usize;
        // §5: at most one insert worker in flight at a time; within a
        // table, insertion order is preserved by issuing the whole
        // bisection tree sequentially rather than fanning sub-batches out
        // concurrently.
        for (table, rows) in batch {
            row_count += rows.len();
            insert_with_bisection(warehouse, &table, rows).await?;
        }

        hooks.done(table_count, row_count).await;
        Ok(())
    }

    /// Drive `flush_once` forever on `interval`, until `shutdown` fires.
    pub async fn flush_loop(
        &self,
        warehouse: Arc<dyn WarehouseClient>,
        hooks: Arc<dyn FlushHooks>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), ShovelError> {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // drain whatever is left before exiting cleanly.
                        self.flush_once(warehouse.as_ref(), hooks.as_ref()).await?;
                        return Ok(());
                    }
                }
            }
            self.flush_once(warehouse.as_ref(), hooks.as_ref()).await?;
        }
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert `rows` into `table`. On failure, recursively bisect until
/// either the whole (sub-)batch succeeds or a failing singleton is
/// isolated, at which point it is reported and the error propagated
/// (fatal, per §7/§8 bisection property).
#[async_recursion::async_recursion]
async fn insert_with_bisection(
    warehouse: &dyn WarehouseClient,
    table: &str,
    rows: Vec<Row>,
) -> Result<(), ShovelError> {
    if rows.is_empty() {
        return Ok(());
    }

    let sql = format!("INSERT INTO {table} VALUES {}", rows.join(", "));
    match warehouse.execute(&sql).await {
        Ok(()) => {
            info!(table, rows = rows.len(), "flushed batch");
            Ok(())
        }
        Err(err) if rows.len() == 1 => {
            error!(table, row = %rows[0], %err, "row rejected by warehouse, isolated by bisection");
            Err(err)
        }
        Err(err) => {
            warn!(table, rows = rows.len(), %err, "batch insert failed, bisecting");
            let mid = rows.len() / 2;
            let (left, right) = rows.split_at(mid);
            insert_with_bisection(warehouse, table, left.to_vec()).await?;
            insert_with_bisection(warehouse, table, right.to_vec()).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHooks {
        started: AtomicUsize,
        done: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FlushHooks for CountingHooks {
        async fn started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        async fn done(&self, _table_count: usize, _row_count: usize) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct AlwaysOk;
    #[async_trait::async_trait]
    impl WarehouseClient for AlwaysOk {
        async fn execute(&self, _sql: &str) -> Result<(), ShovelError> {
            Ok(())
        }
        async fn table_exists(&self, _name: &str) -> Result<bool, ShovelError> {
            Ok(true)
        }
        async fn describe_table(&self, _name: &str) -> Result<crate::warehouse_client::TableColumns, ShovelError> {
            Ok(vec![])
        }
    }

    /// Fails whenever a batch contains the poisoned row, succeeds
    /// otherwise — used to drive bisection down to a singleton.
    struct FailsOnRow(Row);
    #[async_trait::async_trait]
    impl WarehouseClient for FailsOnRow {
        async fn execute(&self, sql: &str) -> Result<(), ShovelError> {
            if sql.contains(&self.0) {
                Err(ShovelError::processing("rejected"))
            } else {
                Ok(())
            }
        }
        async fn table_exists(&self, _name: &str) -> Result<bool, ShovelError> {
            Ok(true)
        }
        async fn describe_table(&self, _name: &str) -> Result<crate::warehouse_client::TableColumns, ShovelError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn insert_then_flush_drains_the_table() {
        let buffer = WriteBuffer::new();
        buffer.insert("events", "(1, 'a')".to_string()).await;
        buffer.insert("events", "(2, 'b')".to_string()).await;

        let warehouse = AlwaysOk;
        let hooks = CountingHooks { started: AtomicUsize::new(0), done: AtomicUsize::new(0) };
        buffer.flush_once(&warehouse, &hooks).await.unwrap();

        assert_eq!(hooks.started.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.done.load(Ordering::SeqCst), 1);

        // buffer is empty now; a second flush is a no-op cycle.
        buffer.flush_once(&warehouse, &hooks).await.unwrap();
        assert_eq!(hooks.done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bisection_isolates_the_bad_row_of_eight() {
        let buffer = WriteBuffer::new();
        for i in 0..8 {
            buffer.insert("t", format!("({i})")).await;
        }
        let warehouse = FailsOnRow("(7)".to_string());
        let hooks = NoHooks;
        let err = buffer.flush_once(&warehouse, &hooks).await.unwrap_err();
        assert!(matches!(err, ShovelError::Processing(_)));
    }

    #[tokio::test]
    async fn row_order_preserved_within_a_table() {
        let buffer = WriteBuffer::new();
        buffer.insert("t", "(1)".to_string()).await;
        buffer.insert("t", "(2)".to_string()).await;
        buffer.insert("t", "(3)".to_string()).await;

        struct Capture(Mutex<Vec<String>>);
        #[async_trait::async_trait]
        impl WarehouseClient for Capture {
            async fn execute(&self, sql: &str) -> Result<(), ShovelError> {
                self.0.lock().await.push(sql.to_string());
                Ok(())
            }
            async fn table_exists(&self, _name: &str) -> Result<bool, ShovelError> {
                Ok(true)
            }
            async fn describe_table(&self, _name: &str) -> Result<crate::warehouse_client::TableColumns, ShovelError> {
                Ok(vec![])
            }
        }

        let capture = Capture(Mutex::new(Vec::new()));
        buffer.flush_once(&capture, &NoHooks).await.unwrap();
        let calls = capture.0.lock().await;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("(1), (2), (3)"));
    }
}
