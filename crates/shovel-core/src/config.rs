//! Layered settings: `config.yaml` (optional) → environment variables
//! (`__`-separated, e.g. `CLICKHOUSE__HOST`) → typed defaults. Matches the
//! `config`-crate bootstrap every binary in this repo shares.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    pub archive_node_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSettings {
    pub host: String,
    #[serde(default = "default_clickhouse_port")]
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_clickhouse_port() -> u16 {
    8123
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShovelSettings {
    /// Shrinks the flush interval to 1s and enables verbose buffer
    /// logging, mirroring the source's `DEBUG_MODE` flag.
    #[serde(default)]
    pub debug: bool,
    /// Optional Prometheus exporter bind port. `None` disables metrics.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ShovelSettings {
    fn default() -> Self {
        Self {
            debug: false,
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmcSettings {
    pub token: Option<String>,
}

/// The full set of externally supplied settings. Every field that has no
/// sane default is required; loading fails fast rather than silently
/// defaulting to an unusable value.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainSettings,
    pub warehouse: WarehouseSettings,
    #[serde(default)]
    pub shovel: ShovelSettings,
    #[serde(default)]
    pub cmc: CmcSettings,
}

impl Default for CmcSettings {
    fn default() -> Self {
        Self { token: None }
    }
}

impl Settings {
    /// Load from `config.yaml` (if present) layered under environment
    /// variables. Environment variables always win, and use the
    /// convention `SECTION__FIELD` (e.g. `WAREHOUSE__HOST`), plus the
    /// legacy flat names the source used directly (`CLICKHOUSE_HOST`,
    /// `SUBSTRATE_ARCHIVE_NODE_URL`, `CMC_TOKEN`) for drop-in compatibility.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder()
            .add_source(File::with_name("config").required(false))
            .set_default("warehouse.port", 8123_i64)?
            .set_default("shovel.debug", false)?;

        if let Ok(v) = std::env::var("SUBSTRATE_ARCHIVE_NODE_URL") {
            builder = builder.set_override("chain.archive_node_url", v)?;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_HOST") {
            builder = builder.set_override("warehouse.host", v)?;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_PORT") {
            builder = builder.set_override("warehouse.port", v)?;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_DB") {
            builder = builder.set_override("warehouse.database", v)?;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_USER") {
            builder = builder.set_override("warehouse.user", v)?;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_PASSWORD") {
            builder = builder.set_override("warehouse.password", v)?;
        }
        if let Ok(v) = std::env::var("CMC_TOKEN") {
            builder = builder.set_override("cmc.token", v)?;
        }
        if let Ok(v) = std::env::var("SHOVEL_DEBUG") {
            builder = builder.set_override("shovel.debug", v == "1" || v == "true")?;
        }
        if let Ok(v) = std::env::var("SHOVEL_METRICS_PORT") {
            builder = builder.set_override("shovel.metrics_port", v)?;
        }

        let settings = builder
            .add_source(Environment::default().separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn flush_interval(&self) -> std::time::Duration {
        if self.shovel.debug {
            std::time::Duration::from_secs(1)
        } else {
            std::time::Duration::from_secs(5)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_interval_switches_on_debug() {
        let settings = Settings {
            chain: ChainSettings { archive_node_url: "ws://x".into() },
            warehouse: WarehouseSettings {
                host: "localhost".into(),
                port: 8123,
                database: "bittensor".into(),
                user: None,
                password: None,
            },
            shovel: ShovelSettings { debug: true, metrics_port: None },
            cmc: CmcSettings { token: None },
        };
        assert_eq!(settings.flush_interval(), std::time::Duration::from_secs(1));
    }
}
