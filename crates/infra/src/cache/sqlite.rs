//! SQLite-backed TTL cache.
//!
//! ## Layout
//!
//! ```sql
//! api_cache(cache_key TEXT PRIMARY KEY, data TEXT, created_at INTEGER, expires_at INTEGER)
//! ```
//!
//! Timestamps are Unix epoch milliseconds. Payloads are JSON text.
//!
//! ## Threading
//!
//! The public API is synchronous so it can be called from job worker threads.
//! Each call is driven to completion on a runtime owned by the store, over a
//! shared sqlx connection pool (WAL journal, busy timeout) so concurrent
//! readers and writers on different keys do not open a connection per call.
//! Calling it from inside another async runtime's worker is not supported.
//!
//! ## Error Mapping
//!
//! Every sqlx failure (pool closed, I/O, locked database past the busy timeout)
//! maps to `CacheError::Unavailable` naming the operation. Undecodable payloads
//! and timestamps map to `CacheError::Serialization`.

use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::runtime::Runtime;

use cardiovar_core::{Clock, SystemClock};

use super::{CacheEntry, CacheError, CacheStats, CacheStore, KeyPattern, check_ttl};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS api_cache (
        cache_key  TEXT PRIMARY KEY,
        data       TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    )
"#;

const CREATE_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS api_cache_expires_at ON api_cache (expires_at)";

/// Durable local cache store.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
    runtime: Arc<Runtime>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl SqliteCacheStore {
    /// Open (creating if missing) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>, default_ttl: Duration) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::unavailable("open", format!("{}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(StdDuration::from_secs(5));
        let pool_options = SqlitePoolOptions::new().max_connections(8);

        Self::connect(options, pool_options, default_ttl)
    }

    /// Private in-memory database (one pinned connection), for tests/dev.
    pub fn in_memory(default_ttl: Duration) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::unavailable("open", e))?;
        // Every connection to `:memory:` is a distinct database; keep exactly one alive.
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);

        Self::connect(options, pool_options, default_ttl)
    }

    fn connect(
        options: SqliteConnectOptions,
        pool_options: SqlitePoolOptions,
        default_ttl: Duration,
    ) -> Result<Self, CacheError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("cache-store")
            .enable_all()
            .build()
            .map_err(|e| CacheError::unavailable("open", e))?;

        let pool = runtime.block_on(async {
            let pool = pool_options
                .connect_with(options)
                .await
                .map_err(|e| CacheError::unavailable("open", e))?;
            sqlx::query(CREATE_TABLE)
                .execute(&pool)
                .await
                .map_err(|e| CacheError::unavailable("create table", e))?;
            sqlx::query(CREATE_EXPIRY_INDEX)
                .execute(&pool)
                .await
                .map_err(|e| CacheError::unavailable("create index", e))?;
            Ok::<_, CacheError>(pool)
        })?;

        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
            clock: Arc::new(SystemClock),
            default_ttl,
        })
    }

    /// Replace the clock used for expiry arithmetic.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn from_millis(key: &str, millis: i64) -> Result<DateTime<Utc>, CacheError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| CacheError::serialization(key, format!("timestamp {millis} out of range")))
}

impl CacheStore for SqliteCacheStore {
    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = self.block_on(
            sqlx::query("SELECT data, created_at, expires_at FROM api_cache WHERE cache_key = ?1")
                .bind(key)
                .fetch_optional(&self.pool),
        );
        let row = match row.map_err(|e| CacheError::unavailable("get", e))? {
            Some(row) => row,
            None => return Ok(None),
        };

        let data: String = row
            .try_get("data")
            .map_err(|e| CacheError::serialization(key, e))?;
        let created_at: i64 = row
            .try_get("created_at")
            .map_err(|e| CacheError::serialization(key, e))?;
        let expires_at: i64 = row
            .try_get("expires_at")
            .map_err(|e| CacheError::serialization(key, e))?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload: serde_json::from_str(&data).map_err(|e| CacheError::serialization(key, e))?,
            created_at: from_millis(key, created_at)?,
            expires_at: from_millis(key, expires_at)?,
        }))
    }

    fn get_fresh(&self, key: &str, max_age: Option<Duration>) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        match self.entry(key)? {
            Some(entry) if entry.is_servable(now, max_age) => {
                tracing::debug!(key, "cache hit");
                Ok(Some(entry.payload))
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
        let data = serde_json::to_string(value).map_err(|e| CacheError::serialization(key, e))?;
        let created_at = self.clock.now();
        let expires_at = created_at + ttl;

        self.block_on(
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO api_cache (cache_key, data, created_at, expires_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(key)
            .bind(data)
            .bind(created_at.timestamp_millis())
            .bind(expires_at.timestamp_millis())
            .execute(&self.pool),
        )
        .map_err(|e| CacheError::unavailable("set", e))?;

        tracing::debug!(key, ttl_secs = ttl.num_seconds(), "cached payload");
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let result = self
            .block_on(
                sqlx::query("DELETE FROM api_cache WHERE cache_key = ?1")
                    .bind(key)
                    .execute(&self.pool),
            )
            .map_err(|e| CacheError::unavailable("invalidate", e))?;
        let removed = result.rows_affected() > 0;
        tracing::info!(key, removed, "invalidated cache key");
        Ok(removed)
    }

    fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let pattern = KeyPattern::parse(pattern);
        let result = self
            .block_on(
                sqlx::query("DELETE FROM api_cache WHERE cache_key GLOB ?1")
                    .bind(pattern.to_glob())
                    .execute(&self.pool),
            )
            .map_err(|e| CacheError::unavailable("invalidate_pattern", e))?;
        let deleted = result.rows_affected();
        tracing::info!(pattern = %pattern, deleted, "invalidated cache keys by pattern");
        Ok(deleted)
    }

    fn sweep_expired(&self) -> Result<u64, CacheError> {
        let result = self
            .block_on(
                sqlx::query("DELETE FROM api_cache WHERE expires_at < ?1")
                    .bind(self.now_millis())
                    .execute(&self.pool),
            )
            .map_err(|e| CacheError::unavailable("sweep_expired", e))?;
        let deleted = result.rows_affected();
        tracing::info!(deleted, "cleared expired cache entries");
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<u64, CacheError> {
        let result = self
            .block_on(sqlx::query("DELETE FROM api_cache").execute(&self.pool))
            .map_err(|e| CacheError::unavailable("clear_all", e))?;
        let deleted = result.rows_affected();
        tracing::info!(deleted, "cleared all cache entries");
        Ok(deleted)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let (total, expired): (i64, i64) = self
            .block_on(
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*),
                           COALESCE(SUM(CASE WHEN expires_at < ?1 THEN 1 ELSE 0 END), 0)
                    FROM api_cache
                    "#,
                )
                .bind(self.now_millis())
                .fetch_one(&self.pool),
            )
            .map_err(|e| CacheError::unavailable("stats", e))?;

        Ok(CacheStats {
            total: total.max(0) as u64,
            expired: expired.max(0) as u64,
        })
    }
}
