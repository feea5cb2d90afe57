//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use cardiovar_core::JobId;

use super::types::{Job, JobState, RegistryStats};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Store a new job.
    fn insert(&self, job: Job) -> Result<JobId, JobError>;

    /// Get a job by ID.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobError>;

    /// Replace an existing job.
    fn update(&self, job: &Job) -> Result<(), JobError>;

    /// All jobs, oldest first.
    fn list(&self) -> Result<Vec<Job>, JobError>;

    /// Remove terminal jobs last updated before `cutoff`. Returns the count.
    fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError>;

    /// Job counts by state.
    fn stats(&self) -> Result<RegistryStats, JobError> {
        let mut stats = RegistryStats::default();
        for job in self.list()? {
            stats.count(job.state);
        }
        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn insert(&self, job: Job) -> Result<JobId, JobError> {
        (**self).insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobError> {
        (**self).update(job)
    }

    fn list(&self) -> Result<Vec<Job>, JobError> {
        (**self).list()
    }

    fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError> {
        (**self).remove_finished_before(cutoff)
    }

    fn stats(&self) -> Result<RegistryStats, JobError> {
        (**self).stats()
    }
}

/// Job registry error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition { id: JobId, from: JobState, to: JobState },
    #[error("failed to start worker for job {id}: {message}")]
    Spawn { id: JobId, message: String },
    #[error("timed out waiting for job {0}")]
    Timeout(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned(err: impl std::fmt::Display) -> JobError {
    JobError::Storage(format!("job store lock poisoned: {err}"))
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<JobId, JobError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(JobError::NotFound(job.id)),
        }
    }

    fn list(&self) -> Result<Vec<Job>, JobError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by_key(|j| (j.created_at, j.id));
        Ok(all)
    }

    fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.state.is_terminal() && job.updated_at < cutoff));
        Ok(before - jobs.len())
    }

    fn stats(&self) -> Result<RegistryStats, JobError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut stats = RegistryStats::default();
        for job in jobs.values() {
            stats.count(job.state);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn insert_and_get() {
        let store = InMemoryJobStore::new();
        let job = Job::single(Utc::now());
        let id = store.insert(job.clone()).unwrap();

        assert_eq!(store.get(id).unwrap(), Some(job.clone()));
        assert!(matches!(store.insert(job), Err(JobError::AlreadyExists(_))));
    }

    #[test]
    fn unknown_id_is_none_and_update_fails() {
        let store = InMemoryJobStore::new();
        let job = Job::single(Utc::now());

        assert_eq!(store.get(job.id).unwrap(), None);
        assert!(matches!(store.update(&job), Err(JobError::NotFound(_))));
    }

    #[test]
    fn remove_finished_keeps_active_and_recent_jobs() {
        let store = InMemoryJobStore::new();
        let old = Utc::now() - Duration::hours(2);

        let mut done = Job::single(old);
        done.mark_processing(old).unwrap();
        done.mark_completed(None, old).unwrap();
        let running = {
            let mut j = Job::batch(3, old);
            j.mark_processing(old).unwrap();
            j
        };
        let mut fresh = Job::single(Utc::now());
        fresh.mark_processing(Utc::now()).unwrap();
        fresh.mark_failed("x", Utc::now()).unwrap();

        for job in [done, running.clone(), fresh.clone()] {
            store.insert(job).unwrap();
        }

        let removed = store.remove_finished_before(Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(running.id).unwrap().is_some());
        assert!(store.get(fresh.id).unwrap().is_some());

        let stats = store.stats().unwrap();
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 2);
    }
}
