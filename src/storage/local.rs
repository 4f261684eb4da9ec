//! On-disk store backed by redb.
//!
//! redb calls are synchronous and short; the async trait methods just call
//! through.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use super::KeyValueStore;

const KV_TABLE: TableDefinition<&str, &str> = TableDefinition::new("client_kv");

pub struct LocalStore {
    db: Database,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("Failed to open vote database at {}", path.display()))?;
        // Ensure table exists
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(KV_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize> {
        let rtxn = self.db.begin_read()?;
        let table = rtxn.open_table(KV_TABLE)?;
        Ok(table.len()? as usize)
    }

    /// All keys starting with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let rtxn = self.db.begin_read()?;
        let table = rtxn.open_table(KV_TABLE)?;
        let mut keys = Vec::new();
        for item in table.range(prefix..)? {
            let (key, _) = item?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    fn backend_name(&self) -> &str {
        "redb"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let rtxn = self.db.begin_read()?;
        let table = rtxn.open_table(KV_TABLE)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(KV_TABLE)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}
