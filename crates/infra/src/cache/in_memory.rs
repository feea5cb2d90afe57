//! In-memory cache store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Duration;
use serde_json::Value;

use cardiovar_core::{Clock, SystemClock};

use super::{CacheEntry, CacheError, CacheStats, CacheStore, KeyPattern, check_ttl};

/// Lock-guarded map with the same expiry semantics as the SQLite store.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl InMemoryCacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            default_ttl,
        }
    }

    pub fn arc(default_ttl: Duration) -> Arc<Self> {
        Arc::new(Self::new(default_ttl))
    }

    fn read(&self, op: &'static str) -> Result<RwLockReadGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries
            .read()
            .map_err(|_| CacheError::unavailable(op, "lock poisoned"))
    }

    fn write(&self, op: &'static str) -> Result<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::unavailable(op, "lock poisoned"))
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl CacheStore for InMemoryCacheStore {
    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.read("entry")?.get(key).cloned())
    }

    fn get_fresh(&self, key: &str, max_age: Option<Duration>) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        let entries = self.read("get")?;
        match entries.get(key) {
            Some(entry) if entry.is_servable(now, max_age) => {
                tracing::debug!(key, "cache hit");
                Ok(Some(entry.payload.clone()))
            }
            Some(_) => {
                tracing::debug!(key, "cache entry expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let ttl = check_ttl(ttl.unwrap_or(self.default_ttl))?;
        let entry = CacheEntry::new(key, value.clone(), self.clock.now(), ttl);
        self.write("set")?.insert(key.to_string(), entry);
        tracing::debug!(key, ttl_secs = ttl.num_seconds(), "cached payload");
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.write("invalidate")?.remove(key).is_some();
        tracing::info!(key, removed, "invalidated cache key");
        Ok(removed)
    }

    fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let pattern = KeyPattern::parse(pattern);
        let mut entries = self.write("invalidate_pattern")?;
        let before = entries.len();
        entries.retain(|key, _| !pattern.matches(key));
        let deleted = (before - entries.len()) as u64;
        tracing::info!(pattern = %pattern, deleted, "invalidated cache keys by pattern");
        Ok(deleted)
    }

    fn sweep_expired(&self) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let mut entries = self.write("sweep_expired")?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at >= now);
        let deleted = (before - entries.len()) as u64;
        tracing::info!(deleted, "cleared expired cache entries");
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<u64, CacheError> {
        let mut entries = self.write("clear_all")?;
        let deleted = entries.len() as u64;
        entries.clear();
        tracing::info!(deleted, "cleared all cache entries");
        Ok(deleted)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = self.clock.now();
        let entries = self.read("stats")?;
        Ok(CacheStats {
            total: entries.len() as u64,
            expired: entries.values().filter(|e| e.expires_at < now).count() as u64,
        })
    }
}
