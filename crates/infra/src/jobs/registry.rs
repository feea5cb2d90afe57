//! Job registry: submission, background execution and polling.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use cardiovar_core::{Clock, JobId, SystemClock};

use super::store::{JobError, JobStore};
use super::types::{ItemOutcome, Job, RegistryStats};

/// Error returned by a producer for one input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProduceError(String);

impl ProduceError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProduceError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ProduceError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The domain computation a job runs for each input.
pub trait Produce: Send + Sync {
    fn produce(&self, input: &Value) -> Result<Value, ProduceError>;
}

impl<F> Produce for F
where
    F: Fn(&Value) -> Result<Value, ProduceError> + Send + Sync,
{
    fn produce(&self, input: &Value) -> Result<Value, ProduceError> {
        self(input)
    }
}

/// Owns job records and runs one worker thread per submitted job.
///
/// Submission never blocks on execution. Within a job only its own worker
/// writes the record; the store handles cross-job concurrency.
pub struct JobRegistry<S: JobStore> {
    store: Arc<S>,
    producer: Arc<dyn Produce>,
    clock: Arc<dyn Clock>,
}

impl<S: JobStore> Clone for JobRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            producer: self.producer.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: JobStore + 'static> JobRegistry<S> {
    pub fn new(store: S, producer: impl Produce + 'static) -> Self {
        Self {
            store: Arc::new(store),
            producer: Arc::new(producer),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a pending single job and start its worker.
    pub fn submit_single(&self, input: Value) -> Result<JobId, JobError> {
        let job = Job::single(self.clock.now());
        let id = self.store.insert(job)?;
        info!(job_id = %id, "single job submitted");

        let worker = self.worker();
        self.spawn(id, move || worker.run_single(id, input))?;
        Ok(id)
    }

    /// Create a pending batch job over `inputs` and start its worker.
    pub fn submit_batch(&self, inputs: Vec<Value>) -> Result<JobId, JobError> {
        let job = Job::batch(inputs.len(), self.clock.now());
        let id = self.store.insert(job)?;
        info!(job_id = %id, total = inputs.len(), "batch job submitted");

        let worker = self.worker();
        self.spawn(id, move || worker.run_batch(id, inputs))?;
        Ok(id)
    }

    /// Snapshot of job `id`.
    pub fn get_status(&self, id: JobId) -> Result<Job, JobError> {
        self.store.get(id)?.ok_or(JobError::NotFound(id))
    }

    pub fn stats(&self) -> Result<RegistryStats, JobError> {
        self.store.stats()
    }

    /// Drop terminal jobs whose last update is older than `older_than`.
    pub fn purge_finished(&self, older_than: chrono::Duration) -> Result<usize, JobError> {
        let removed = self.store.remove_finished_before(self.clock.now() - older_than)?;
        if removed > 0 {
            info!(removed, "purged finished jobs");
        }
        Ok(removed)
    }

    /// Poll until job `id` is terminal or `timeout` elapses.
    pub fn wait(&self, id: JobId, timeout: Duration) -> Result<Job, JobError> {
        self.wait_with(id, timeout, |_| {})
    }

    /// [`wait`](Self::wait), calling `on_poll` with every snapshot.
    pub fn wait_with(
        &self,
        id: JobId,
        timeout: Duration,
        mut on_poll: impl FnMut(&Job),
    ) -> Result<Job, JobError> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.get_status(id)?;
            on_poll(&job);
            if job.state.is_terminal() {
                return Ok(job);
            }
            if Instant::now() >= deadline {
                return Err(JobError::Timeout(id));
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn worker(&self) -> Worker<S> {
        Worker {
            store: self.store.clone(),
            producer: self.producer.clone(),
            clock: self.clock.clone(),
        }
    }

    fn spawn(&self, id: JobId, body: impl FnOnce() + Send + 'static) -> Result<(), JobError> {
        let spawned = thread::Builder::new().name(format!("job-{id}")).spawn(body);
        if let Err(e) = spawned {
            error!(job_id = %id, error = %e, "failed to spawn job worker");
            let mut job = self.get_status(id)?;
            job.mark_failed(format!("worker spawn failed: {e}"), self.clock.now())?;
            self.store.update(&job)?;
            return Err(JobError::Spawn {
                id,
                message: e.to_string(),
            });
        }
        Ok(())
    }
}

impl<S: JobStore> std::fmt::Debug for JobRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").field("clock", &self.clock).finish_non_exhaustive()
    }
}

/// State moved into a worker thread.
struct Worker<S: JobStore> {
    store: Arc<S>,
    producer: Arc<dyn Produce>,
    clock: Arc<dyn Clock>,
}

impl<S: JobStore> Worker<S> {
    fn run_single(&self, id: JobId, input: Value) {
        let outcome = self.start(id).and_then(|mut job| {
            match self.produce(&input) {
                Ok(value) => {
                    job.mark_completed(Some(value), self.clock.now())?;
                    info!(job_id = %id, "single job completed");
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "single job failed");
                    job.mark_failed(e.to_string(), self.clock.now())?;
                }
            }
            self.store.update(&job)
        });

        if let Err(e) = outcome {
            error!(job_id = %id, error = %e, "single job worker aborted");
        }
    }

    fn run_batch(&self, id: JobId, inputs: Vec<Value>) {
        let mut job = match self.start(id) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %id, error = %e, "batch job setup failed");
                self.fail(id, &e.to_string());
                return;
            }
        };

        for (index, input) in inputs.into_iter().enumerate() {
            let item = match self.produce(&input) {
                Ok(value) => ItemOutcome::success(input, value),
                Err(e) => {
                    debug!(job_id = %id, index, error = %e, "batch item failed");
                    ItemOutcome::failed(input, e.to_string())
                }
            };

            let recorded = job
                .record_item(item, self.clock.now())
                .and_then(|()| self.store.update(&job));
            if let Err(e) = recorded {
                error!(job_id = %id, index, error = %e, "batch job aborted");
                self.fail(id, &e.to_string());
                return;
            }
        }

        let finished = job
            .mark_completed(None, self.clock.now())
            .and_then(|()| self.store.update(&job));
        match finished {
            Ok(()) => {
                let failed = job.items().iter().filter(|i| !i.is_success()).count();
                info!(job_id = %id, total = job.items().len(), failed, "batch job completed");
            }
            Err(e) => error!(job_id = %id, error = %e, "failed to complete batch job"),
        }
    }

    /// Load the job and move it to `processing`.
    fn start(&self, id: JobId) -> Result<Job, JobError> {
        let mut job = self.store.get(id)?.ok_or(JobError::NotFound(id))?;
        job.mark_processing(self.clock.now())?;
        self.store.update(&job)?;
        debug!(job_id = %id, "job processing");
        Ok(job)
    }

    /// Best-effort transition to `failed` after an error outside the producer.
    fn fail(&self, id: JobId, message: &str) {
        let result = self.store.get(id).and_then(|job| {
            let mut job = job.ok_or(JobError::NotFound(id))?;
            job.mark_failed(message, self.clock.now())?;
            self.store.update(&job)
        });
        if let Err(e) = result {
            error!(job_id = %id, error = %e, "could not record job failure");
        }
    }

    /// Run the producer, turning a panic into an error.
    fn produce(&self, input: &Value) -> Result<Value, ProduceError> {
        let producer = &self.producer;
        match panic::catch_unwind(AssertUnwindSafe(|| producer.produce(input))) {
            Ok(result) => result,
            Err(payload) => Err(ProduceError::new(format!("producer panicked: {}", panic_message(&*payload)))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
