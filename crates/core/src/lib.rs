//! `cardiovar-core`: shared primitives for the data-source layer.
//!
//! This crate contains **pure** types (no I/O): the catalogue of data kinds,
//! source keys, job identifiers and the clock seam used for expiry checks.

pub mod clock;
pub mod error;
pub mod id;
pub mod kind;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use id::JobId;
pub use kind::{DataKind, SourceKey};
