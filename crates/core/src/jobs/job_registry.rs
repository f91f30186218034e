use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::jobs::job::{Job, JobError, JobResult};

/// Synchronized table of every job known to the process.
///
/// Callers only ever receive cloned snapshots; the records themselves are
/// mutated in place under the lock. Waiters are woken on every terminal
/// transition.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Job>>,
    finished: Condvar,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, job: Job) -> Result<(), JobError> {
        let mut jobs = self.lock();
        if jobs.contains_key(&job.job_id) {
            return Err(JobError::Duplicate(job.job_id));
        }
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.lock().get(job_id).cloned()
    }

    fn update(
        &self,
        job_id: &str,
        apply: impl FnOnce(&mut Job) -> Result<(), JobError>,
    ) -> Result<Job, JobError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        apply(job)?;
        let snapshot = job.clone();
        drop(jobs);
        if snapshot.is_terminal() {
            self.finished.notify_all();
        }
        Ok(snapshot)
    }

    pub fn start(&self, job_id: &str) -> Result<Job, JobError> {
        self.update(job_id, Job::start)
    }

    pub fn complete(&self, job_id: &str, result: JobResult) -> Result<Job, JobError> {
        self.update(job_id, |job| job.complete(result))
    }

    pub fn fail(&self, job_id: &str, error: impl Into<String>) -> Result<Job, JobError> {
        self.update(job_id, |job| job.fail(error))
    }

    /// Blocks until the job is terminal or `timeout` elapses, then returns
    /// its latest snapshot. `None` if the job is unknown.
    pub fn wait(&self, job_id: &str, timeout: Duration) -> Option<Job> {
        let deadline = Instant::now() + timeout;
        let mut jobs = self.lock();
        loop {
            let job = jobs.get(job_id)?;
            let now = Instant::now();
            if job.is_terminal() || now >= deadline {
                return Some(job.clone());
            }
            let (guard, _) = self
                .finished
                .wait_timeout(jobs, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            jobs = guard;
        }
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.lock().values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs
    }

    /// Removes a terminal job. Running or pending jobs stay put.
    pub fn evict(&self, job_id: &str) -> Result<Job, JobError> {
        let mut jobs = self.lock();
        match jobs.get(job_id).map(Job::is_terminal) {
            None => Err(JobError::NotFound(job_id.to_string())),
            Some(false) => Err(JobError::Active(job_id.to_string())),
            Some(true) => jobs
                .remove(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string())),
        }
    }
}
