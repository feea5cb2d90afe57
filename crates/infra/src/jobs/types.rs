//! Core job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cardiovar_core::JobId;

use super::store::JobError;

/// Job lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Submitted, worker not started yet
    Pending,
    /// Worker running
    Processing,
    /// Finished; batch jobs finish here even when items failed
    Completed,
    /// Producer error or setup failure
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Processing)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed,
}

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub input: Value,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn success(input: Value, value: Value) -> Self {
        Self {
            input,
            status: ItemStatus::Success,
            value: Some(value),
            error: None,
        }
    }

    pub fn failed(input: Value, error: impl Into<String>) -> Self {
        Self {
            input,
            status: ItemStatus::Failed,
            value: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

/// Kind-specific part of a job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobDetail {
    Single {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Batch {
        total: usize,
        processed: usize,
        results: Vec<ItemOutcome>,
    },
}

/// A job record as owned by the registry.
///
/// Serializes to the poll shape: `{id, kind, state, error?, result?}` for
/// single jobs, `{id, kind, state, total, processed, results}` for batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub detail: JobDetail,
}

impl Job {
    pub fn single(now: DateTime<Utc>) -> Self {
        Self::with_detail(JobDetail::Single { result: None }, now)
    }

    pub fn batch(total: usize, now: DateTime<Utc>) -> Self {
        Self::with_detail(
            JobDetail::Batch {
                total,
                processed: 0,
                results: Vec::with_capacity(total),
            },
            now,
        )
    }

    fn with_detail(detail: JobDetail, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
            error: None,
            detail,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.detail, JobDetail::Batch { .. })
    }

    /// Single-job result, if any.
    pub fn result(&self) -> Option<&Value> {
        match &self.detail {
            JobDetail::Single { result } => result.as_ref(),
            JobDetail::Batch { .. } => None,
        }
    }

    /// `(processed, total)` for batch jobs.
    pub fn progress(&self) -> Option<(usize, usize)> {
        match &self.detail {
            JobDetail::Batch { total, processed, .. } => Some((*processed, *total)),
            JobDetail::Single { .. } => None,
        }
    }

    pub fn items(&self) -> &[ItemOutcome] {
        match &self.detail {
            JobDetail::Batch { results, .. } => results,
            JobDetail::Single { .. } => &[],
        }
    }

    fn transition(&mut self, next: JobState, now: DateTime<Utc>) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        self.transition(JobState::Processing, now)
    }

    /// Finish; `result` is stored for single jobs and ignored for batches.
    pub fn mark_completed(&mut self, result: Option<Value>, now: DateTime<Utc>) -> Result<(), JobError> {
        self.transition(JobState::Completed, now)?;
        if let JobDetail::Single { result: slot } = &mut self.detail {
            *slot = result;
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), JobError> {
        self.transition(JobState::Failed, now)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Append one batch item outcome and advance `processed`.
    pub fn record_item(&mut self, outcome: ItemOutcome, now: DateTime<Utc>) -> Result<(), JobError> {
        let id = self.id;
        match &mut self.detail {
            JobDetail::Batch {
                total,
                processed,
                results,
            } if *processed < *total && self.state == JobState::Processing => {
                results.push(outcome);
                *processed += 1;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(JobError::Storage(format!("job {id} cannot accept another batch item"))),
        }
    }
}

/// Job counts by state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl RegistryStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    pub(crate) fn count(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Processing => self.processing += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
        }
    }
}
