//! The extrinsics shovel (§4.G): per block, fetch extrinsics and events,
//! build an `extrinsic_idx → success` map from `System.ExtrinsicSuccess`/
//! `ExtrinsicFailed`, resolve the dynamic-schema table for each
//! extrinsic's call shape, and buffer one row per extrinsic. Every
//! indexed extrinsic in the success map must have been emitted a row —
//! a gap means the chain and the success map disagree, which is fatal.

use async_trait::async_trait;

use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_schema::value::Value;
use shovel_schema::{derive_columns, literal::format_literal};
use shovel_warehouse::resolver::TableResolver;
use shovels::sql::{datetime_literal, nullable_int_literal, nullable_string_literal};
use shovels::{Args, Bootstrap};

struct ExtrinsicsProcessor {
    chain: std::sync::Arc<dyn ChainApi>,
    buffer: shovel_core::WriteBuffer,
    block_meta: std::sync::Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: std::sync::Arc<shovel_warehouse::WarehouseTimestampSource>,
    resolver: TableResolver,
}

#[async_trait]
impl BlockProcessor for ExtrinsicsProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let extrinsics = self.chain.get_extrinsics(block_number).await?;
        let events = self.chain.get_events(&hash).await?;

        let mut success_by_idx = std::collections::HashMap::new();
        for event in &events {
            let Some(idx) = event.extrinsic_idx else { continue };
            if event.module_id != "System" {
                continue;
            }
            match event.event_id.as_str() {
                "ExtrinsicSuccess" => {
                    success_by_idx.insert(idx, true);
                }
                "ExtrinsicFailed" => {
                    success_by_idx.insert(idx, false);
                }
                _ => {}
            }
        }

        let mut emitted = std::collections::HashSet::new();

        for (extrinsic_index, extrinsic) in extrinsics.iter().enumerate() {
            let idx = extrinsic_index as u32;
            let success = success_by_idx.get(&idx).copied().unwrap_or(false);

            let args = Value::Map(
                extrinsic
                    .call_args
                    .iter()
                    .map(|arg| (arg.name.clone(), arg.value.clone()))
                    .collect(),
            );
            let columns = derive_columns(&args, None);
            let table = self
                .resolver
                .resolve_extrinsics_table(&extrinsic.call_module, &extrinsic.call_function, &columns)
                .await?;

            let mut values = vec![
                block_number.to_string(),
                datetime_literal(ts),
                extrinsic_index.to_string(),
                format!("'{}'", extrinsic.call_function.replace('\'', "\\'")),
                format!("'{}'", extrinsic.call_module.replace('\'', "\\'")),
                success.to_string(),
                nullable_string_literal(&extrinsic.address),
                nullable_int_literal(extrinsic.nonce),
                nullable_int_literal(extrinsic.tip),
            ];
            values.extend(columns.iter().map(|c| format_literal(&c.value)));

            let row = format!("({})", values.join(", "));
            self.buffer.insert(table, row).await;
            emitted.insert(idx);
        }

        for idx in success_by_idx.keys() {
            if !emitted.contains(idx) {
                return Err(ShovelError::processing(format!(
                    "extrinsic index {idx} has a System.ExtrinsicSuccess/Failed event at block {block_number} \
                     but no corresponding extrinsic was emitted"
                )));
            }
        }

        shovels::metrics::record_block_processed("extrinsics");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("extrinsics", 1, &args).await?;

    let processor = ExtrinsicsProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
        resolver: TableResolver::new(bootstrap.warehouse.clone()),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}
