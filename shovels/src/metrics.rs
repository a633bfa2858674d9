//! Optional Prometheus exporter (§2.1), off unless `SHOVEL_METRICS_PORT`
//! (or `--metrics-port`) is set. Grounded in the teacher's
//! `metrics_exporter_prometheus::PrometheusBuilder` bootstrap, narrowed to
//! the three gauges/counters a shovel actually emits.

use std::net::{Ipv4Addr, SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

/// Install the Prometheus recorder bound on `port`, if set. A no-op when
/// `port` is `None` — metrics calls elsewhere become cheap no-ops against
/// the default recorder.
pub fn maybe_install(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!(%addr, "prometheus exporter listening"),
        Err(err) => warn!(%err, "failed to install prometheus exporter"),
    }
}

/// One block finished processing.
pub fn record_block_processed(shovel: &str) {
    metrics::counter!("shovel_blocks_processed_total", "shovel" => shovel.to_string()).increment(1);
}

/// Current size of `table`'s in-memory queue, sampled right after a push.
pub fn record_buffer_rows(table: &str, rows: usize) {
    metrics::gauge!("shovel_buffer_rows", "table" => table.to_string()).set(rows as f64);
}

/// The block number just made durable in `shovel_checkpoints`.
pub fn record_checkpoint_block(shovel: &str, block_number: u64) {
    metrics::gauge!("shovel_checkpoint_block", "shovel" => shovel.to_string()).set(block_number as f64);
}
