//! Per-row serialization for read-modify-write cycles on holdings and cash.

use crate::core::model::Market;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A holding row when `code` is set, otherwise the market's cash row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    pub account_id: String,
    pub market: Market,
    pub code: Option<String>,
}

impl LockKey {
    pub fn holding(account_id: &str, market: Market, code: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            market,
            code: Some(code.to_string()),
        }
    }

    pub fn cash(account_id: &str, market: Market) -> Self {
        Self {
            account_id: account_id.to_string(),
            market,
            code: None,
        }
    }
}

type LockTable = HashMap<LockKey, Arc<Mutex<()>>>;

/// Registry of async mutexes keyed by row. Entries live only while some
/// caller holds or waits on them.
#[derive(Default)]
pub struct KeyLocks {
    table: StdMutex<LockTable>,
}

/// Held locks for one set of keys. Dropping it releases them and prunes
/// entries nobody else is using.
pub struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks every key, in sorted order so overlapping sets cannot deadlock.
    pub async fn acquire(&self, mut keys: Vec<LockKey>) -> KeyGuard<'_> {
        keys.sort();
        keys.dedup();
        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut table = self.table();
            keys.iter()
                .map(|k| Arc::clone(table.entry(k.clone()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        KeyGuard {
            owner: self,
            keys,
            guards,
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.table().len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        // The table's own reference is the last one when nobody waits.
        let mut table = self.owner.table();
        for key in &self.keys {
            if table.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
                table.remove(key);
            }
        }
    }
}
