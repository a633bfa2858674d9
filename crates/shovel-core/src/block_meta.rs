//! Block metadata lookup: `(timestamp, block hash)` for a block number,
//! cached in 10k-block windows loaded from the warehouse, falling back to
//! the chain when a number falls outside the loaded window.
//!
//! The block hash is never cached (§4.C): only the timestamp is worth
//! caching, since it is the expensive half of the pair to keep warm (the
//! hash is a single cheap chain call either way).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::chain_client::ChainApi;
use crate::error::ShovelError;

const WINDOW_SIZE: u64 = 10_000;

/// Loads a `block_number → timestamp` window from the warehouse, used to
/// avoid a chain round trip for every metadata lookup that falls inside
/// an already-loaded window. The concrete implementation reads whichever
/// table carries `(block_number, timestamp)` pairs (the block-timestamps
/// shovel's own output table).
#[async_trait::async_trait]
pub trait TimestampWindowSource: Send + Sync {
    async fn load_window(
        &self,
        window_start: u64,
        window_end: u64,
    ) -> Result<Vec<(u64, DateTime<Utc>)>, ShovelError>;
}

/// Resolves `(timestamp, block hash)` pairs for a block number, caching a
/// sliding window of timestamps from the warehouse and always fetching
/// the hash fresh from the chain.
pub struct BlockMetadataCache {
    window: Mutex<Option<LoadedWindow>>,
}

struct LoadedWindow {
    start: u64,
    end: u64,
    timestamps: HashMap<u64, DateTime<Utc>>,
}

impl BlockMetadataCache {
    pub fn new() -> Self {
        Self { window: Mutex::new(None) }
    }

    /// `(timestamp, block_hash)` for block `n`. Ensures the cache window
    /// containing `n` is loaded (falling back to a direct chain query if
    /// the source has nothing for `n`), then always fetches the hash from
    /// the chain.
    pub async fn get_block_metadata(
        &self,
        chain: &dyn ChainApi,
        source: &dyn TimestampWindowSource,
        n: u64,
    ) -> Result<(DateTime<Utc>, String), ShovelError> {
        let block_hash = chain.get_block_hash(n).await?;

        if let Some(ts) = self.cached_timestamp(n) {
            return Ok((ts, block_hash));
        }

        self.load_window_containing(source, n).await?;
        if let Some(ts) = self.cached_timestamp(n) {
            return Ok((ts, block_hash));
        }

        // Window load didn't cover it (e.g. block newer than anything the
        // warehouse has indexed yet): fall back to the chain directly.
        let now = chain.query("Timestamp", "Now", &block_hash, &[]).await?;
        let millis = now.as_int().ok_or_else(|| {
            ShovelError::processing("Timestamp.Now did not decode to an integer")
        })?;
        let ts = DateTime::from_timestamp_millis(millis as i64)
            .ok_or_else(|| ShovelError::processing("Timestamp.Now out of range"))?;
        Ok((ts, block_hash))
    }

    fn cached_timestamp(&self, n: u64) -> Option<DateTime<Utc>> {
        let guard = self.window.lock().unwrap();
        guard.as_ref().and_then(|w| {
            if n >= w.start && n <= w.end {
                w.timestamps.get(&n).copied()
            } else {
                None
            }
        })
    }

    async fn load_window_containing(
        &self,
        source: &dyn TimestampWindowSource,
        n: u64,
    ) -> Result<(), ShovelError> {
        let start = (n / WINDOW_SIZE) * WINDOW_SIZE;
        let end = start + WINDOW_SIZE - 1;
        let rows = source.load_window(start, end).await?;
        let timestamps = rows.into_iter().collect();
        *self.window.lock().unwrap() = Some(LoadedWindow { start, end, timestamps });
        Ok(())
    }
}

impl Default for BlockMetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shovel_schema::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubChain {
        query_calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ChainApi for StubChain {
        async fn get_chain_finalised_head(&self) -> Result<String, ShovelError> {
            Ok("0xhead".into())
        }
        async fn get_block_number(&self, _: &str) -> Result<u64, ShovelError> {
            Ok(0)
        }
        async fn get_block_hash(&self, n: u64) -> Result<String, ShovelError> {
            Ok(format!("0xblock{n}"))
        }
        async fn query(
            &self,
            _pallet: &str,
            _item: &str,
            _at: &str,
            _params: &[Value],
        ) -> Result<Value, ShovelError> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(1_700_000_000_000))
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

    struct EmptyWindowSource;

    #[async_trait::async_trait]
    impl TimestampWindowSource for EmptyWindowSource {
        async fn load_window(&self, _: u64, _: u64) -> Result<Vec<(u64, DateTime<Utc>)>, ShovelError> {
            Ok(vec![])
        }
    }

    struct HitWindowSource;

    #[async_trait::async_trait]
    impl TimestampWindowSource for HitWindowSource {
        async fn load_window(&self, start: u64, end: u64) -> Result<Vec<(u64, DateTime<Utc>)>, ShovelError> {
            Ok((start..=end)
                .map(|n| (n, DateTime::from_timestamp(n as i64, 0).unwrap()))
                .collect())
        }
    }

    #[tokio::test]
    async fn falls_back_to_chain_when_window_misses() {
        let chain = StubChain { query_calls: AtomicU32::new(0) };
        let source = EmptyWindowSource;
        let cache = BlockMetadataCache::new();

        let (_, hash) = cache.get_block_metadata(&chain, &source, 42).await.unwrap();
        assert_eq!(hash, "0xblock42");
        assert_eq!(chain.query_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_window_avoids_chain_timestamp_query() {
        let chain = StubChain { query_calls: AtomicU32::new(0) };
        let source = HitWindowSource;
        let cache = BlockMetadataCache::new();

        cache.get_block_metadata(&chain, &source, 5).await.unwrap();
        assert_eq!(chain.query_calls.load(Ordering::SeqCst), 0);
    }
}
