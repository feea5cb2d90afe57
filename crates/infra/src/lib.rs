//! Infrastructure layer: cache store, upstream resilience, tiered sourcing,
//! background jobs and settings.

pub mod cache;
pub mod jobs;
pub mod resilience;
pub mod settings;
pub mod sources;


pub use cache::{CacheEntry, CacheError, CacheStats, CacheStore, CacheStoreExt, InMemoryCacheStore, SqliteCacheStore};
pub use settings::{Settings, SettingsError};
