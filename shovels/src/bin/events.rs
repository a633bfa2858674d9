//! The events shovel (§4.G): per block, fetch every emitted event, assign
//! a per-block-monotonic `event_index` to preserve order (events can
//! duplicate by content within one block, so index alone disambiguates),
//! resolve the dynamic-schema table for each event's `(module, name)`
//! shape, and buffer one row per event.

use async_trait::async_trait;

use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::WriteBuffer;
use shovel_schema::{derive_columns, literal::format_literal};
use shovel_warehouse::resolver::TableResolver;
use shovels::sql::datetime_literal;
use shovels::{Args, Bootstrap};

struct EventsProcessor {
    chain: std::sync::Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    block_meta: std::sync::Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: std::sync::Arc<shovel_warehouse::WarehouseTimestampSource>,
    resolver: TableResolver,
}

#[async_trait]
impl BlockProcessor for EventsProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let events = self.chain.get_events(&hash).await?;

        for (event_index, event) in events.into_iter().enumerate() {
            let columns = derive_columns(&event.attributes, None);
            let table = self
                .resolver
                .resolve_events_table(&event.module_id, &event.event_id, &columns)
                .await?;

            let mut values = vec![block_number.to_string(), datetime_literal(ts), event_index.to_string()];
            values.extend(columns.iter().map(|c| format_literal(&c.value)));

            let row = format!("({})", values.join(", "));
            self.buffer.insert(table, row).await;
        }

        shovels::metrics::record_block_processed("events");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("events", 1, &args).await?;

    let processor = EventsProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
        resolver: TableResolver::new(bootstrap.warehouse.clone()),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}
