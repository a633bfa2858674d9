//! The warehouse-side half of the dynamic-schema engine (§4.F):
//! `tableNameFor(module, name, columns)`. `shovel-schema` owns the pure
//! naming/comparison helpers; this module drives the actual `v0..v49`
//! probing loop, since only the warehouse client can `DESCRIBE TABLE` or
//! `CREATE TABLE`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use shovel_core::error::ShovelError;
use shovel_core::warehouse_client::{escape_identifier, WarehouseClient};
use shovel_schema::columns::DerivedColumn;
use shovel_schema::ss58::is_valid_ss58_address;
use shovel_schema::table::{
    base_table_name, columns_match, prefix_columns, versioned_table_name, TableKind, MAX_VERSIONS,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: u8,
    module: String,
    name: String,
    columns: Vec<String>,
}

/// Resolves (and lazily creates) the versioned table a given
/// (module, name, column-set) fingerprint maps to, caching the result so
/// repeat payloads of the same shape skip the probing loop entirely.
pub struct TableResolver {
    client: Arc<dyn WarehouseClient>,
    cache: Mutex<HashMap<CacheKey, String>>,
}

impl TableResolver {
    pub fn new(client: Arc<dyn WarehouseClient>) -> Self {
        Self { client, cache: Mutex::new(HashMap::new()) }
    }

    pub async fn resolve_events_table(
        &self,
        module: &str,
        event: &str,
        columns: &[DerivedColumn],
    ) -> Result<String, ShovelError> {
        self.resolve(TableKind::Events, module, event, columns).await
    }

    pub async fn resolve_extrinsics_table(
        &self,
        module: &str,
        call: &str,
        columns: &[DerivedColumn],
    ) -> Result<String, ShovelError> {
        self.resolve(TableKind::Extrinsics, module, call, columns).await
    }

    async fn resolve(
        &self,
        kind: TableKind,
        module: &str,
        name: &str,
        columns: &[DerivedColumn],
    ) -> Result<String, ShovelError> {
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let key = CacheKey {
            kind: kind as u8,
            module: module.to_lowercase(),
            name: name.to_lowercase(),
            columns: column_names.clone(),
        };
        if let Some(table) = self.cache.lock().unwrap().get(&key).cloned() {
            return Ok(table);
        }

        let base = base_table_name(kind, module, name);
        let prefix: Vec<String> = prefix_columns(kind).iter().map(|(n, _)| n.to_string()).collect();
        let expected: Vec<String> = prefix.iter().cloned().chain(column_names.clone()).collect();

        for version in 0..MAX_VERSIONS {
            let table = versioned_table_name(&base, version);
            if !self.client.table_exists(&table).await? {
                self.create_table(&table, kind, columns).await?;
                self.cache.lock().unwrap().insert(key, table.clone());
                return Ok(table);
            }
            let existing = self.client.describe_table(&table).await?;
            let existing_names: Vec<String> = existing.into_iter().map(|(n, _)| n).collect();
            if columns_match(&expected, &existing_names) {
                self.cache.lock().unwrap().insert(key, table.clone());
                return Ok(table);
            }
        }

        Err(ShovelError::processing(format!(
            "table '{base}' has exceeded {MAX_VERSIONS} shape versions"
        )))
    }

    async fn create_table(
        &self,
        table: &str,
        kind: TableKind,
        columns: &[DerivedColumn],
    ) -> Result<(), ShovelError> {
        let mut column_defs: Vec<String> = prefix_columns(kind)
            .iter()
            .map(|(name, ty)| format!("{} {}", escape_identifier(name), ty))
            .collect();
        for col in columns {
            column_defs.push(format!("{} {}", escape_identifier(&col.name), col.sql_type));
        }

        let order_by = match kind {
            TableKind::Events => {
                let mut keys = vec!["block_number".to_string(), "timestamp".to_string(), "event_index".to_string()];
                keys.extend(columns.iter().filter(|c| is_ss58_column(c)).map(|c| c.name.clone()));
                keys
            }
            TableKind::Extrinsics => vec![
                "call_module".to_string(),
                "call_function".to_string(),
                "timestamp".to_string(),
                "extrinsic_index".to_string(),
            ],
        };

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} ({cols}) \
             ENGINE = ReplacingMergeTree \
             PARTITION BY toYYYYMM(timestamp) \
             ORDER BY ({order})",
            cols = column_defs.join(", "),
            order = order_by.iter().map(|k| escape_identifier(k)).collect::<Vec<_>>().join(", "),
        );
        self.client.execute(&sql).await
    }
}

fn is_ss58_column(col: &DerivedColumn) -> bool {
    col.value.as_str().map(is_valid_ss58_address).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shovel_core::warehouse_client::TableColumns;
    use shovel_schema::value::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FreshWarehouse {
        creates: AtomicU32,
    }

    #[async_trait]
    impl WarehouseClient for FreshWarehouse {
        async fn execute(&self, _sql: &str) -> Result<(), ShovelError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn table_exists(&self, _name: &str) -> Result<bool, ShovelError> {
            Ok(false)
        }
        async fn describe_table(&self, _name: &str) -> Result<TableColumns, ShovelError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn fresh_module_creates_v0_and_caches() {
        let warehouse = Arc::new(FreshWarehouse { creates: AtomicU32::new(0) });
        let resolver = TableResolver::new(warehouse.clone());
        let columns = vec![DerivedColumn { name: "amount".into(), sql_type: "Int64".into(), value: Value::Int(1) }];

        let table = resolver.resolve_events_table("Balances", "Transfer", &columns).await.unwrap();
        assert_eq!(table, "events_shovel_balances_transfer_v0");
        assert_eq!(warehouse.creates.load(Ordering::SeqCst), 1);

        // second call with the same shape hits the cache, no further DDL.
        resolver.resolve_events_table("Balances", "Transfer", &columns).await.unwrap();
        assert_eq!(warehouse.creates.load(Ordering::SeqCst), 1);
    }

    struct ShapeShifter;

    #[async_trait]
    impl WarehouseClient for ShapeShifter {
        async fn execute(&self, _sql: &str) -> Result<(), ShovelError> {
            Ok(())
        }
        async fn table_exists(&self, name: &str) -> Result<bool, ShovelError> {
            Ok(name.ends_with("_v0"))
        }
        async fn describe_table(&self, _name: &str) -> Result<TableColumns, ShovelError> {
            Ok(vec![
                ("block_number".into(), "UInt64".into()),
                ("timestamp".into(), "DateTime".into()),
                ("event_index".into(), "UInt64".into()),
                ("foo".into(), "String".into()),
            ])
        }
    }

    #[tokio::test]
    async fn mismatched_columns_bump_version() {
        let warehouse = Arc::new(ShapeShifter);
        let resolver = TableResolver::new(warehouse);
        let columns = vec![
            DerivedColumn { name: "foo".into(), sql_type: "String".into(), value: Value::String("a".into()) },
            DerivedColumn { name: "bar".into(), sql_type: "Int64".into(), value: Value::Int(1) },
        ];
        let table = resolver.resolve_events_table("M", "E", &columns).await.unwrap();
        assert_eq!(table, "events_shovel_m_e_v1");
    }
}
