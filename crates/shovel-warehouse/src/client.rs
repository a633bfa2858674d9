//! The concrete `WarehouseClient`: a per-worker ClickHouse connection with
//! connect-and-ping on first use, bounded linear retry, and a
//! once-true-stays-true `table_exists` cache (§4.A).
//!
//! Grounded in the teacher's `PostgresStorage::connect` shape (a thin
//! struct wrapping a driver handle, built via a `connect`/`Options`
//! pair) but reworked around the `clickhouse` crate's stateless `Client`
//! (cloning a `Client` is cheap — it just clones the HTTP client and
//! connection options, there is no pool to share).

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use clickhouse::Row;
use serde::Deserialize;
use tracing::{info, warn};

use shovel_core::error::ShovelError;
use shovel_core::warehouse_client::{TableColumns, WarehouseClient};

/// How many times `connect` retries the initial ping before giving up.
pub const CONNECT_RETRIES: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ClickhouseOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ClickhouseOptions {
    fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// A per-worker handle onto the warehouse. The configured database is
/// threaded through the connection's options (`with_database`), never
/// concatenated into SQL text — see §9's "no hard-coded schema prefix"
/// decision.
pub struct ClickhouseWarehouse {
    client: clickhouse::Client,
    known_tables: Mutex<HashSet<String>>,
}

impl ClickhouseWarehouse {
    /// The underlying typed client, for the handful of call sites inside
    /// this crate (`checkpoint.rs`, `timestamps.rs`, `resolver.rs`) that
    /// need to `SELECT` rows back rather than just `execute`/probe —
    /// `WarehouseClient`'s trait surface deliberately stays narrow
    /// (execute + existence probing, §4.A) since that's the only contract
    /// the rest of the workspace needs to be backend-agnostic over.
    pub(crate) fn raw(&self) -> &clickhouse::Client {
        &self.client
    }

    /// Build the client, verifying connectivity with a `SELECT 1` ping,
    /// retried up to [`CONNECT_RETRIES`] times, 1s apart. Exhaustion is a
    /// `ShovelError::Database` (retryable by the caller's own policy, but
    /// startup itself is not expected to recover without operator
    /// intervention).
    pub async fn connect(options: ClickhouseOptions) -> Result<Self, ShovelError> {
        let mut client = clickhouse::Client::default()
            .with_url(options.url())
            .with_database(&options.database);
        if let Some(user) = &options.user {
            client = client.with_user(user);
        }
        if let Some(password) = &options.password {
            client = client.with_password(password);
        }

        let mut last_err = None;
        for attempt in 1..=CONNECT_RETRIES {
            match client.query("SELECT 1").execute().await {
                Ok(()) => {
                    info!(host = %options.host, database = %options.database, "warehouse connected");
                    return Ok(Self { client, known_tables: Mutex::new(HashSet::new()) });
                }
                Err(err) => {
                    warn!(attempt, %err, "warehouse ping failed, retrying");
                    last_err = Some(err);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
        Err(ShovelError::database(format!(
            "failed to connect to warehouse after {CONNECT_RETRIES} attempts: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[derive(Row, Deserialize)]
struct DescribeRow {
    name: String,
    #[serde(rename = "type")]
    type_: String,
}

#[derive(Row, Deserialize)]
struct ExistsRow {
    #[allow(dead_code)]
    name: String,
}

#[async_trait]
impl WarehouseClient for ClickhouseWarehouse {
    async fn execute(&self, sql: &str) -> Result<(), ShovelError> {
        self.client
            .query(sql)
            .execute()
            .await
            .map_err(|err| ShovelError::database(format!("warehouse execute failed: {err}")))
    }

    async fn table_exists(&self, name: &str) -> Result<bool, ShovelError> {
        if self.known_tables.lock().unwrap().contains(name) {
            return Ok(true);
        }
        let rows: Vec<ExistsRow> = self
            .client
            .query("SHOW TABLES LIKE ?")
            .bind(name)
            .fetch_all()
            .await
            .map_err(|err| ShovelError::database(format!("SHOW TABLES failed: {err}")))?;
        let exists = !rows.is_empty();
        if exists {
            self.known_tables.lock().unwrap().insert(name.to_string());
        }
        Ok(exists)
    }

    async fn describe_table(&self, name: &str) -> Result<TableColumns, ShovelError> {
        let rows: Vec<DescribeRow> = self
            .client
            .query(&format!("DESCRIBE TABLE {name}"))
            .fetch_all()
            .await
            .map_err(|err| ShovelError::database(format!("DESCRIBE TABLE failed: {err}")))?;
        Ok(rows.into_iter().map(|r| (r.name, r.type_)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_formats_host_and_port() {
        let opts = ClickhouseOptions {
            host: "warehouse.internal".into(),
            port: 8123,
            database: "bittensor".into(),
            user: None,
            password: None,
        };
        assert_eq!(opts.url(), "http://warehouse.internal:8123");
    }
}
