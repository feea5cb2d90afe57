//! Keyed TTL cache for upstream payloads.
//!
//! ## Design
//!
//! - One logical table keyed by an opaque string (`"<kind>:<part>:..."`)
//! - Payloads are JSON values; `created_at` / `expires_at` per entry
//! - Expiry is checked lazily on every read; `sweep_expired` is maintenance only
//! - Last write wins for concurrent `set` calls on the same key
//! - Store failures are surfaced to the caller, never masked
//!
//! ## Components
//!
//! - `CacheStore`: store abstraction (sync, shareable across worker threads)
//! - `SqliteCacheStore`: durable local store (sqlx SQLite pool)
//! - `InMemoryCacheStore`: lock-guarded map for tests/dev
//! - `KeyPattern`: LIKE/glob matching used by `invalidate_pattern`

pub mod in_memory;
pub mod pattern;
pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use in_memory::InMemoryCacheStore;
pub use pattern::KeyPattern;
pub use sqlite::SqliteCacheStore;

/// One cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: Value, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// `true` once `now` is past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// `true` if the entry may be served at `now` under an optional age bound.
    pub fn is_servable(&self, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
        if self.is_expired(now) {
            return false;
        }
        match max_age {
            Some(max) => now.signed_duration_since(self.created_at) <= max,
            None => true,
        }
    }
}

/// Cache occupancy snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: u64,
    pub expired: u64,
}

/// Cache store error.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache store unavailable during {op}: {message}")]
    Unavailable { op: &'static str, message: String },
    #[error("cache payload for `{key}` could not be (de)serialized: {message}")]
    Serialization { key: String, message: String },
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
}

impl CacheError {
    pub(crate) fn unavailable(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            op,
            message: err.to_string(),
        }
    }

    pub(crate) fn serialization(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

pub(crate) fn check_ttl(ttl: Duration) -> Result<Duration, CacheError> {
    if ttl < Duration::zero() {
        return Err(CacheError::InvalidTtl(format!("negative ttl {ttl}")));
    }
    Ok(ttl)
}

/// TTL cache store abstraction.
pub trait CacheStore: Send + Sync {
    /// TTL applied by `set` when the caller passes `None`.
    fn default_ttl(&self) -> Duration;

    /// Raw entry for `key`, expired or not (admin/inspection).
    fn entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Payload for `key` if present, unexpired and (optionally) younger than `max_age`.
    fn get_fresh(&self, key: &str, max_age: Option<Duration>) -> Result<Option<Value>, CacheError>;

    /// Insert or overwrite `key`; `expires_at = now + ttl`.
    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Delete `key`. Returns whether an entry was removed.
    fn invalidate(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key matching `pattern` (see [`KeyPattern`]). Returns the count.
    fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Delete entries with `expires_at < now`. Returns the count.
    fn sweep_expired(&self) -> Result<u64, CacheError>;

    /// Delete everything. Returns the count.
    fn clear_all(&self) -> Result<u64, CacheError>;

    fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Payload for `key` if present and unexpired.
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.get_fresh(key, None)
    }
}

impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    fn default_ttl(&self) -> Duration {
        (**self).default_ttl()
    }

    fn entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        (**self).entry(key)
    }

    fn get_fresh(&self, key: &str, max_age: Option<Duration>) -> Result<Option<Value>, CacheError> {
        (**self).get_fresh(key, max_age)
    }

    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        (**self).set(key, value, ttl)
    }

    fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        (**self).invalidate(key)
    }

    fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        (**self).invalidate_pattern(pattern)
    }

    fn sweep_expired(&self) -> Result<u64, CacheError> {
        (**self).sweep_expired()
    }

    fn clear_all(&self) -> Result<u64, CacheError> {
        (**self).clear_all()
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        (**self).stats()
    }
}

/// Typed helpers over any [`CacheStore`].
pub trait CacheStoreExt: CacheStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::serialization(key, e)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value).map_err(|e| CacheError::serialization(key, e))?;
        self.set(key, &value, ttl)
    }
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_expiry_is_strictly_after_expires_at() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", Value::from(1), now, Duration::seconds(10));

        assert!(!entry.is_expired(now));
        assert!(!entry.is_expired(now + Duration::seconds(10)));
        assert!(entry.is_expired(now + Duration::seconds(10) + Duration::milliseconds(1)));
    }

    #[test]
    fn max_age_bounds_servability() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", Value::Null, now, Duration::hours(24));

        let later = now + Duration::hours(2);
        assert!(entry.is_servable(later, None));
        assert!(entry.is_servable(later, Some(Duration::hours(3))));
        assert!(!entry.is_servable(later, Some(Duration::hours(1))));
    }

    #[test]
    fn negative_ttl_is_rejected() {
        assert!(check_ttl(Duration::seconds(-1)).is_err());
        assert!(check_ttl(Duration::zero()).is_ok());
    }
}
