//! Background job registry for single and batch annotation requests.
//!
//! ## Design
//!
//! - Jobs are `single` (one input, one result) or `batch` (ordered inputs,
//!   per-item outcomes)
//! - One worker thread per submitted job; submission returns immediately
//! - States only move forward: pending → processing → completed | failed
//! - Batch items are processed sequentially and fail independently
//! - Records live until explicitly purged
//!
//! ## Components
//!
//! - `Job`: record plus poll-shaped serialization
//! - `JobStore`: persistence for jobs (in-memory)
//! - `JobRegistry`: submission, workers, polling
//! - `Produce`: the domain computation run per input

pub mod registry;
pub mod store;
pub mod types;

pub use registry::{JobRegistry, Produce, ProduceError};
pub use store::{InMemoryJobStore, JobError, JobStore};
pub use types::{ItemOutcome, ItemStatus, Job, JobDetail, JobState, RegistryStats};
