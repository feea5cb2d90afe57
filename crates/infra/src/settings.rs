//! Runtime settings: TOML file, then environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cardiovar_core::DataKind;

use crate::resilience::RetryPolicy;

pub const ENV_CACHE_DB: &str = "CARDIOVAR_CACHE_DB";
pub const ENV_DATA_DIR: &str = "CARDIOVAR_DATA_DIR";
pub const ENV_DEFAULT_TTL_HOURS: &str = "CARDIOVAR_DEFAULT_TTL_HOURS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub db_path: PathBuf,
    pub default_ttl_hours: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("cardiovar_cache.db"),
            default_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackSettings {
    pub data_dir: PathBuf,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Per-kind overrides; unset fields keep the catalog defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindSettings {
    pub ttl_hours: Option<u64>,
    pub attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub timeout_ms: Option<u64>,
    pub rate_calls: Option<u32>,
    pub rate_period_ms: Option<u64>,
    pub reseed_cache: Option<bool>,
}

impl KindSettings {
    pub fn retry(&self, default: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.unwrap_or(default.attempts),
            initial_backoff: self
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default.initial_backoff),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(default.backoff_multiplier),
            max_backoff: default.max_backoff,
        }
    }

    pub fn ttl(&self, default: chrono::Duration) -> chrono::Duration {
        self.ttl_hours
            .map(|h| chrono::Duration::hours(h as i64))
            .unwrap_or(default)
    }

    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }

    /// `(calls, period)` rate budget.
    pub fn rate(&self, calls: u32, period: Duration) -> (u32, Duration) {
        (
            self.rate_calls.unwrap_or(calls),
            self.rate_period_ms.map(Duration::from_millis).unwrap_or(period),
        )
    }

    pub fn reseed_cache(&self, default: bool) -> bool {
        self.reseed_cache.unwrap_or(default)
    }

    fn validate(&self, kind: DataKind) -> Result<(), SettingsError> {
        if self.attempts == Some(0) {
            return Err(SettingsError::Invalid(format!("kinds.{kind}.attempts must be at least 1")));
        }
        if let Some(m) = self.backoff_multiplier {
            if !(m >= 1.0 && m.is_finite()) {
                return Err(SettingsError::Invalid(format!(
                    "kinds.{kind}.backoff_multiplier must be >= 1.0, got {m}"
                )));
            }
        }
        if self.rate_calls == Some(0) {
            return Err(SettingsError::Invalid(format!("kinds.{kind}.rate_calls must be at least 1")));
        }
        if self.rate_period_ms == Some(0) {
            return Err(SettingsError::Invalid(format!("kinds.{kind}.rate_period_ms must be positive")));
        }
        if self.timeout_ms == Some(0) {
            return Err(SettingsError::Invalid(format!("kinds.{kind}.timeout_ms must be positive")));
        }
        Ok(())
    }
}

/// All runtime settings.
///
/// ```toml
/// [cache]
/// db_path = "/var/lib/cardiovar/cache.db"
/// default_ttl_hours = 24
///
/// [fallback]
/// data_dir = "data"
///
/// [kinds.clinvar]
/// attempts = 5
/// rate_calls = 10
/// rate_period_ms = 1000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub cache: CacheSettings,
    pub fallback: FallbackSettings,
    pub kinds: BTreeMap<DataKind, KindSettings>,
}

impl Settings {
    /// Load from `path` (defaults if absent), apply the process environment
    /// and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::warn!(path = %path.display(), "settings file not found; using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        settings.apply_env(|var| std::env::var(var).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|e| match e {
            SettingsError::Parse { message, .. } => SettingsError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, SettingsError> {
        toml::from_str(raw).map_err(|e| SettingsError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `CARDIOVAR_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), SettingsError> {
        if let Some(db) = lookup(ENV_CACHE_DB) {
            self.cache.db_path = PathBuf::from(db);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.fallback.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_DEFAULT_TTL_HOURS) {
            self.cache.default_ttl_hours = raw.trim().parse().map_err(|e| SettingsError::Env {
                var: ENV_DEFAULT_TTL_HOURS,
                message: format!("`{raw}`: {e}"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cache.default_ttl_hours == 0 {
            return Err(SettingsError::Invalid("cache.default_ttl_hours must be at least 1".into()));
        }
        for (kind, overrides) in &self.kinds {
            overrides.validate(*kind)?;
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.default_ttl_hours as i64)
    }

    /// Overrides for `kind`; empty if none were configured.
    pub fn kind(&self, kind: DataKind) -> KindSettings {
        self.kinds.get(&kind).cloned().unwrap_or_default()
    }
}
