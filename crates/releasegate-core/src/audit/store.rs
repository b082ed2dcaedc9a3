//! Key-value capability backing the audit log.
//!
//! Stores only promise key-sorted, prefix-filtered listing in bounded pages.
//! Callers walk pages by handing back the returned cursor until it is `None`.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use crate::error::{GateError, Result};

/// Upper bound on keys returned by one `list` call.
pub const MAX_LIST_PAGE: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// Resume point for the next page. `None` once the listing is complete.
    pub cursor: Option<String>,
}

pub trait KvStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// List keys starting with `prefix`, strictly after `cursor` when given.
    fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<KeyPage>;
    fn delete(&self, key: &str) -> Result<()>;
}

pub(crate) fn start_bound<'a>(prefix: &'a str, cursor: Option<&'a str>) -> Bound<&'a str> {
    match cursor {
        Some(c) if c >= prefix => Bound::Excluded(c),
        _ => Bound::Included(prefix),
    }
}

/// Collect up to `limit` matching keys from an ordered key iterator.
pub(crate) fn page_from<I>(keys: I, prefix: &str, limit: usize) -> KeyPage
where
    I: Iterator<Item = String>,
{
    let limit = limit.clamp(1, MAX_LIST_PAGE);
    let mut out = Vec::new();
    let mut more = false;
    for key in keys.take_while(|k| k.starts_with(prefix)) {
        if out.len() == limit {
            more = true;
            break;
        }
        out.push(key);
    }
    let cursor = if more { out.last().cloned() } else { None };
    KeyPage { keys: out, cursor }
}

// ---------------------------------------------------------------------------
// NoopStore
// ---------------------------------------------------------------------------

/// Used when no durable store is configured: writes vanish, listings are empty.
#[derive(Debug, Default)]
pub struct NoopStore;

impl KvStore for NoopStore {
    fn put(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn list(&self, _prefix: &str, _cursor: Option<&str>, _limit: usize) -> Result<KeyPage> {
        Ok(KeyPage::default())
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| GateError::Store("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<KeyPage> {
        let entries = self.lock()?;
        let start = start_bound(prefix, cursor);
        let keys = entries
            .range::<str, _>((start, Bound::Unbounded))
            .map(|(k, _)| k.clone());
        Ok(page_from(keys, prefix, limit))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
