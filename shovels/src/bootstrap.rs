//! Process bootstrap shared by every shovel `main()` (§2.1): tracing,
//! layered settings, the connected chain/warehouse handles, the write
//! buffer with its flush loop spawned, and ctrl-c-triggered shutdown.
//! Grounded in the teacher's `arch-indexer` `main()` shape (`dotenv`,
//! `clap::Parser` args, `tracing_subscriber::registry()`, a background
//! sync task raced against shutdown) adapted to a single-cursor shovel
//! rather than an HTTP server.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shovel_chain::SubstrateChainClient;
use shovel_core::{
    BlockMetadataCache, BlockProcessor, ChainApi, Checkpoint, CheckpointStore, FlushHooks,
    Settings, ShovelError, ShovelRuntime, WarehouseClient, WriteBuffer,
};
use shovel_warehouse::{
    ClickhouseOptions, ClickhouseWarehouse, WarehouseCheckpointStore, WarehouseTimestampSource,
};

/// Flags every shovel binary shares.
#[derive(Parser, Debug)]
pub struct Args {
    /// Shrinks the flush interval to 1s and enables verbose buffer logging.
    #[arg(long)]
    pub debug: bool,

    /// Overrides the block this shovel starts from when no checkpoint exists.
    #[arg(long)]
    pub from_block: Option<u64>,

    /// Deletes this shovel's checkpoint before starting, forcing a full replay.
    #[arg(long)]
    pub reset_checkpoint: bool,
}

/// Everything a shovel `main()` needs once `init` returns: a connected
/// chain client, a connected warehouse, a write buffer whose flush loop
/// is already running in the background, and a runtime ready to drive a
/// [`BlockProcessor`].
pub struct Bootstrap {
    pub chain: Arc<dyn ChainApi>,
    pub warehouse: Arc<ClickhouseWarehouse>,
    pub buffer: WriteBuffer,
    pub runtime: Arc<ShovelRuntime>,
    /// Shared with every other shovel process via the checkpoints table —
    /// dependency-aware shovels (stake-map, subnets) poll this for an
    /// upstream shovel's progress (§4.I/§4.J).
    pub checkpoint_store: Arc<dyn CheckpointStore>,
    /// Resolves `(timestamp, hash)` for a block via the warehouse's own
    /// block-timestamps table, with chain fallback (§4.C). Every simple
    /// shovel besides `block_timestamps` itself should read through this
    /// rather than querying `Timestamp.Now` directly.
    pub block_meta: Arc<BlockMetadataCache>,
    pub timestamp_source: Arc<WarehouseTimestampSource>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl Bootstrap {
    pub async fn init(shovel_name: &str, default_skip_interval: u64, args: &Args) -> Result<Self, ShovelError> {
        init_tracing();

        let settings = Settings::load().map_err(|err| ShovelError::processing(format!("settings: {err}")))?;

        let chain: Arc<dyn ChainApi> =
            Arc::new(SubstrateChainClient::new(settings.chain.archive_node_url.clone()));

        let warehouse = Arc::new(
            ClickhouseWarehouse::connect(ClickhouseOptions {
                host: settings.warehouse.host.clone(),
                port: settings.warehouse.port,
                database: settings.warehouse.database.clone(),
                user: settings.warehouse.user.clone(),
                password: settings.warehouse.password.clone(),
            })
            .await?,
        );

        let checkpoint_store: Arc<dyn CheckpointStore> =
            Arc::new(WarehouseCheckpointStore::new(warehouse.clone()).await?);

        let timestamp_source = Arc::new(WarehouseTimestampSource::new(warehouse.clone()).await?);
        let block_meta = Arc::new(BlockMetadataCache::new());

        if args.reset_checkpoint {
            info!(shovel = shovel_name, "--reset-checkpoint: clearing existing checkpoint");
            let restart_at = args.from_block.unwrap_or(0);
            checkpoint_store
                .save(Checkpoint {
                    shovel_name: shovel_name.to_string(),
                    block_number: restart_at.saturating_sub(1),
                })
                .await?;
        }

        let starting_block = args.from_block.unwrap_or(0);
        let runtime = Arc::new(
            ShovelRuntime::new(
                shovel_name,
                starting_block,
                default_skip_interval,
                chain.clone(),
                checkpoint_store.clone(),
            )
            .await?,
        );

        let buffer = WriteBuffer::new();
        let debug = args.debug || settings.shovel.debug;
        let flush_interval = if debug { Duration::from_secs(1) } else { Duration::from_secs(5) };

        crate::metrics::maybe_install(settings.shovel.metrics_port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let flush_warehouse: Arc<dyn WarehouseClient> = warehouse.clone();
        let flush_hooks: Arc<dyn FlushHooks> = runtime.clone();
        let flush_buffer = buffer.clone();
        let flush_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) =
                flush_buffer.flush_loop(flush_warehouse, flush_hooks, flush_interval, flush_shutdown).await
            {
                tracing::error!(%err, "write buffer flush loop exited with a fatal error");
                std::process::exit(1);
            }
        });

        Ok(Self {
            chain,
            warehouse,
            buffer,
            runtime,
            checkpoint_store,
            block_meta,
            timestamp_source,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn shutdown_rx(&self) -> tokio::sync::watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Drive `processor` through the runtime's catch-up loop, with
    /// `ctrl_c`/SIGTERM racing the loop via the shared shutdown channel.
    pub async fn run(&self, processor: &dyn BlockProcessor) -> Result<(), ShovelError> {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        });
        self.runtime.run(processor, self.shutdown_rx()).await
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
