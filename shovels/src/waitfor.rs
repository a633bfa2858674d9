//! Dependency-wait abstraction (§9 design note): the stake-map and
//! subnets shovels must not emit rows for block `n` until their upstream
//! shovels' checkpoints have reached `n` (§4.I, §4.J, §8 dependency-wait
//! property). This encapsulates the 60s poll loop so that invariant is
//! expressed once rather than hand-rolled per dependency-aware shovel.

use std::time::Duration;

use tracing::info;

use shovel_core::{CheckpointStore, ShovelError};

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Block until every shovel named in `deps` has a checkpoint >= `n`.
pub async fn wait_for(
    store: &dyn CheckpointStore,
    deps: &[&str],
    n: u64,
) -> Result<(), ShovelError> {
    for dep in deps {
        loop {
            let checkpoint = store.load(dep).await?;
            let caught_up = checkpoint.map(|c| c.block_number >= n).unwrap_or(false);
            if caught_up {
                break;
            }
            info!(dependency = %dep, waiting_for = n, "dependency shovel not caught up, sleeping");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shovel_core::{Checkpoint, MemoryCheckpointStore};

    #[tokio::test]
    async fn returns_immediately_when_already_caught_up() {
        let store = MemoryCheckpointStore::new();
        store
            .save(Checkpoint { shovel_name: "events".into(), block_number: 100 })
            .await
            .unwrap();
        wait_for(&store, &["events"], 50).await.unwrap();
    }
}
