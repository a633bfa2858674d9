//! The TAO price-oracle shovel (§4.H, §6): on its own cadence (daily until
//! block 4,249,779, then every 25 blocks, ≈5 minutes), fetches a USD
//! quote for TAO from CoinMarketCap and buffers one row per sampled
//! block. The pre-cutover daily cadence is driven by skipping blocks
//! whose timestamp falls on the same UTC day as the last sample.

use async_trait::async_trait;
use chrono::NaiveDate;

use shovel_core::chain_client::ChainApi;
use shovel_core::error::ShovelError;
use shovel_core::runtime::BlockProcessor;
use shovel_core::warehouse_client::WarehouseClient;
use shovel_core::WriteBuffer;
use shovels::sql::datetime_literal;
use shovels::tables::{create_tao_price_table_sql, TAO_PRICE_TABLE};
use shovels::{Args, Bootstrap, CmcClient};

/// Block at which the sampling cadence switches from daily to every-25.
const CADENCE_CUTOVER_BLOCK: u64 = 4_249_779;
/// Post-cutover cadence (§6: "every 25 blocks").
const POST_CUTOVER_INTERVAL: u64 = 25;
/// TAO's first listing day on CoinMarketCap (§6); timestamps before this
/// are a parameter-validation failure, fatal per §7.
const FIRST_LISTING_DAY: (i32, u32, u32) = (2023, 3, 6);

/// Whether block `block_number`, whose timestamp falls on `day`, should be
/// sampled given the day of the last sample taken (`None` if none yet).
fn should_sample(block_number: u64, day: NaiveDate, last_sampled_day: Option<NaiveDate>) -> bool {
    if block_number >= CADENCE_CUTOVER_BLOCK {
        block_number % POST_CUTOVER_INTERVAL == 0
    } else {
        last_sampled_day != Some(day)
    }
}

struct TaoPriceProcessor {
    chain: std::sync::Arc<dyn ChainApi>,
    buffer: WriteBuffer,
    block_meta: std::sync::Arc<shovel_core::BlockMetadataCache>,
    timestamp_source: std::sync::Arc<shovel_warehouse::WarehouseTimestampSource>,
    cmc: CmcClient,
    last_sampled_day: tokio::sync::Mutex<Option<NaiveDate>>,
}

#[async_trait]
impl BlockProcessor for TaoPriceProcessor {
    async fn process_block(&self, block_number: u64) -> Result<(), ShovelError> {
        let (ts, _hash) = self
            .block_meta
            .get_block_metadata(self.chain.as_ref(), self.timestamp_source.as_ref(), block_number)
            .await?;

        let first_listing = NaiveDate::from_ymd_opt(
            FIRST_LISTING_DAY.0,
            FIRST_LISTING_DAY.1,
            FIRST_LISTING_DAY.2,
        )
        .expect("first listing day is a valid calendar date");
        if ts.date_naive() < first_listing {
            return Err(ShovelError::processing(format!(
                "block {block_number} timestamp {ts} is before TAO's first listing day"
            )));
        }

        let day = ts.date_naive();
        let mut last_sampled_day = self.last_sampled_day.lock().await;
        if !should_sample(block_number, day, *last_sampled_day) {
            return Ok(());
        }

        let quote = self
            .cmc
            .quote_at(ts)
            .await
            .map_err(|err| ShovelError::processing(format!("CMC quote lookup failed: {err}")))?;

        let row = format!(
            "({block_number}, {}, {}, {}, {})",
            datetime_literal(ts),
            quote.price,
            quote.market_cap,
            quote.volume_24h,
        );
        self.buffer.insert(TAO_PRICE_TABLE, row).await;
        *last_sampled_day = Some(day);
        drop(last_sampled_day);

        shovels::metrics::record_block_processed("tao_price");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();
    let bootstrap = Bootstrap::init("tao_price", 1, &args).await?;
    bootstrap.warehouse.execute(&create_tao_price_table_sql()).await?;

    let settings = shovel_core::Settings::load().map_err(|err| anyhow::anyhow!("settings: {err}"))?;
    let token = settings
        .cmc
        .token
        .ok_or_else(|| anyhow::anyhow!("CMC_TOKEN must be set for the tao_price shovel"))?;

    let processor = TaoPriceProcessor {
        chain: bootstrap.chain.clone(),
        buffer: bootstrap.buffer.clone(),
        block_meta: bootstrap.block_meta.clone(),
        timestamp_source: bootstrap.timestamp_source.clone(),
        cmc: CmcClient::new(token),
        last_sampled_day: tokio::sync::Mutex::new(None),
    };
    bootstrap.run(&processor).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_cutover_samples_every_25_blocks() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(should_sample(CADENCE_CUTOVER_BLOCK, day, Some(day)));
        assert!(!should_sample(CADENCE_CUTOVER_BLOCK + 1, day, Some(day)));
    }

    #[test]
    fn pre_cutover_samples_once_per_day() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(!should_sample(100, day, Some(day)));
        let next_day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(should_sample(100, next_day, Some(day)));
    }

    #[test]
    fn first_block_ever_is_always_sampled() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(should_sample(100, day, None));
    }
}
