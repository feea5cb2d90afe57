//! Tiered data sourcing for annotation inputs.
//!
//! ## Design
//!
//! - One generic orchestrator, [`SourceChain`], serves every [`DataKind`]
//! - Per-kind behaviour lives entirely in a [`KindConfig`]
//! - Tiers: cache → live (rate-limited, retried) → delegate kind → static
//!   dataset → synthetic generator → none
//! - `force_live` stops after the live tier
//! - Provenance is returned with every value and accumulated per request in a
//!   [`ProvenanceReport`]; there is no process-wide "fallback used" state
//!
//! ## Components
//!
//! - `LiveSource`: one upstream request for a key
//! - `FallbackSource` / `StaticDataset`: pre-seeded local data
//! - `SyntheticSource`: deterministic key-seeded generators
//! - `SourceChain`: the orchestrator
//!
//! [`DataKind`]: cardiovar_core::DataKind

pub mod chain;
pub mod config;
pub mod fallback;
pub mod provenance;
pub mod synthetic;

pub use chain::SourceChain;
pub use config::{KindConfig, LiveSource, Throttle, UpstreamError};
pub use fallback::{FallbackError, FallbackSource, KeyIndex, StaticDataset, load_fallback_datasets};
pub use provenance::{FetchOutcome, Provenance, ProvenanceEntry, ProvenanceReport};
pub use synthetic::{AlleleFrequencySynth, ConservationSynth, SyntheticSource, TissueExpressionSynth};

use cardiovar_core::{CoreError, DataKind};
use thiserror::Error;

use crate::cache::CacheError;

/// Source chain error. Upstream failures never appear here.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("no source configured for kind {0}")]
    Unregistered(DataKind),
    #[error(transparent)]
    Key(#[from] CoreError),
    #[error("invalid source configuration: {0}")]
    Config(String),
}
