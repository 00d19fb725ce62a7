//! Short-lived read-through cache shared by every adapter in the process.
//!
//! Entries expire after a fixed TTL and are evicted lazily when looked up.
//! There is no capacity bound. Writers refresh entries with the value they
//! just persisted; concurrent writers to one key race and the last put wins.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use authvault_core::TenantContext;
use serde_json::Value;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_millis(5_000);

/// `userId:connectionId:serverUrlHash:filename`.
pub fn cache_key(tenant: &TenantContext, server_url_hash: &str, filename: &str) -> String {
    format!(
        "{}:{}:{server_url_hash}:{filename}",
        tenant.user_id, tenant.connection_id
    )
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted: Instant,
}

#[derive(Debug)]
pub struct ReadCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or `None` if missing or expired. Expired entries are removed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(
            key.into(),
            CacheEntry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned map still holds valid entries; the cache is best-effort.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
