//! Durable audit store using redb.
//!
//! # Table design
//!
//! A single `ENTRIES` table maps UTF-8 string keys to raw bytes. redb keeps
//! keys in byte order, so a range scan starting at a prefix (or just past a
//! cursor key) walks entries in the same order a key-sorted KV service would.

use std::ops::Bound;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use super::store::{page_from, start_bound, KeyPage, KvStore};
use crate::error::{GateError, Result};

/// Key: caller-defined string. Value: opaque bytes (JSON for events).
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

fn db_err(e: impl std::fmt::Display) -> GateError {
    GateError::Store(e.to_string())
}

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the redb database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(ENTRIES).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }
}

impl KvStore for RedbStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ENTRIES).map_err(db_err)?;
            table.insert(key, value).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ENTRIES).map_err(db_err)?;
        let value = table.get(key).map_err(db_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<KeyPage> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ENTRIES).map_err(db_err)?;
        let range = table
            .range::<&str>((start_bound(prefix, cursor), Bound::Unbounded))
            .map_err(db_err)?;

        let mut keys = Vec::new();
        for entry in range {
            let (k, _) = entry.map_err(db_err)?;
            let key = k.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
            // One extra key tells page_from whether more pages remain.
            if keys.len() > limit {
                break;
            }
        }
        Ok(page_from(keys.into_iter(), prefix, limit))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ENTRIES).map_err(db_err)?;
            table.remove(key).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}
