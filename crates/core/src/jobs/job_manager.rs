use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::jobs::job::{Job, JobError};
use crate::jobs::job_registry::JobRegistry;
use crate::jobs::staged_source::StagedSource;
use crate::pipeline::pipeline_factory::PipelineFactory;
use crate::pipeline::pipeline_logger::LogPipelineLogger;
use crate::pipeline::select_portraits_use_case::{PipelineError, SelectionOutcome};
use crate::shared::cancellation::CancellationToken;
use crate::shared::constants::VIDEO_UPLOAD_SUFFIX;

const PROGRESS_LOG_INTERVAL: usize = 250;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobManagerConfig {
    /// Worker threads; each runs one job at a time.
    pub max_concurrent_jobs: usize,
    /// Where uploaded videos are staged until their job finishes.
    pub staging_dir: PathBuf,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            staging_dir: std::env::temp_dir(),
        }
    }
}

struct QueuedJob {
    job_id: String,
    source: StagedSource,
    cancel: CancellationToken,
}

type TokenTable = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Accepts videos, runs each as a background job on a bounded worker pool
/// and exposes job records to callers.
///
/// Layout: `submit → [queue] → worker × N → registry`
///
/// Every job owns its source file. The file is removed before the job
/// leaves `Processing`, whichever way it leaves.
pub struct JobManager {
    registry: Arc<JobRegistry>,
    tokens: TokenTable,
    sender: Option<Sender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
    staging_dir: PathBuf,
}

impl JobManager {
    pub fn new(config: JobManagerConfig, factory: Arc<dyn PipelineFactory>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let tokens: TokenTable = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = crossbeam_channel::unbounded::<QueuedJob>();

        let worker_count = config.max_concurrent_jobs.max(1);
        let workers = (0..worker_count)
            .map(|_| {
                spawn_worker(
                    receiver.clone(),
                    registry.clone(),
                    tokens.clone(),
                    factory.clone(),
                )
            })
            .collect();
        log::info!("Job manager started with {worker_count} worker(s)");

        Self {
            registry,
            tokens,
            sender: Some(sender),
            workers,
            staging_dir: config.staging_dir,
        }
    }

    /// Queue `source_path` for processing. The file (or frame directory)
    /// becomes job-owned and is deleted when the job finishes.
    pub fn submit(&self, source_path: &Path, job_id: Option<String>) -> Result<String, JobError> {
        let sender = self.sender.as_ref().ok_or(JobError::ShutDown)?;
        let job_id = job_id.unwrap_or_else(Job::new_id);
        Job::validate_id(&job_id)?;

        self.registry.insert(Job::new(&job_id, source_path))?;
        let cancel = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone(), cancel.clone());

        let queued = QueuedJob {
            job_id: job_id.clone(),
            source: StagedSource::new(source_path),
            cancel,
        };
        if sender.send(queued).is_err() {
            // The pool is gone; the dropped QueuedJob already removed the file.
            self.record_unqueued(&job_id);
            return Err(JobError::ShutDown);
        }
        log::info!("[{job_id}] Accepted {}", source_path.display());
        Ok(job_id)
    }

    /// Stage an uploaded byte stream as a temporary video and submit it.
    pub fn accept_upload(
        &self,
        reader: &mut dyn Read,
        job_id: Option<String>,
    ) -> Result<String, JobError> {
        if self.sender.is_none() {
            return Err(JobError::ShutDown);
        }
        if let Some(id) = job_id.as_deref() {
            Job::validate_id(id)?;
            if self.registry.get(id).is_some() {
                return Err(JobError::Duplicate(id.to_string()));
            }
        }

        fs::create_dir_all(&self.staging_dir)?;
        let mut staged = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(VIDEO_UPLOAD_SUFFIX)
            .tempfile_in(&self.staging_dir)?;
        let bytes = io::copy(reader, &mut staged)?;
        let (_, path) = staged.keep().map_err(|e| JobError::Staging(e.error))?;
        log::debug!("Staged {bytes} bytes at {}", path.display());

        self.submit(&path, job_id).map_err(|e| {
            let _ = fs::remove_file(&path);
            e
        })
    }

    /// Snapshot of the job's current record.
    pub fn status(&self, job_id: &str) -> Option<Job> {
        self.registry.get(job_id)
    }

    /// Block until the job is terminal or `timeout` elapses.
    pub fn wait(&self, job_id: &str, timeout: Duration) -> Option<Job> {
        self.registry.wait(job_id, timeout)
    }

    /// Request cooperative cancellation. Returns `false` if the job is
    /// unknown or already finished.
    pub fn cancel(&self, job_id: &str) -> bool {
        let tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(job_id) {
            Some(token) => {
                log::info!("[{job_id}] Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.registry.list()
    }

    /// Drop a finished job's record.
    pub fn evict(&self, job_id: &str) -> Result<Job, JobError> {
        self.registry.evict(job_id)
    }

    /// Stop accepting work, cancel outstanding jobs and join the workers.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for token in self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            token.cancel();
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Job worker panicked outside a job");
            }
        }
        log::info!("Job manager stopped");
    }

    /// Marks a job that never reached a worker as failed.
    fn record_unqueued(&self, job_id: &str) {
        self.forget_token(job_id);
        let recorded = self
            .registry
            .start(job_id)
            .and_then(|_| self.registry.fail(job_id, JobError::ShutDown.to_string()));
        if let Err(e) = recorded {
            log::warn!("[{job_id}] Could not record unqueued job: {e}");
        }
    }

    fn forget_token(&self, job_id: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    receiver: Receiver<QueuedJob>,
    registry: Arc<JobRegistry>,
    tokens: TokenTable,
    factory: Arc<dyn PipelineFactory>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for queued in receiver {
            run_job(&registry, &tokens, factory.as_ref(), queued);
        }
    })
}

fn run_job(
    registry: &JobRegistry,
    tokens: &TokenTable,
    factory: &dyn PipelineFactory,
    queued: QueuedJob,
) {
    let QueuedJob {
        job_id,
        mut source,
        cancel,
    } = queued;

    if let Err(e) = registry.start(&job_id) {
        log::error!("[{job_id}] Could not start: {e}");
        return;
    }
    log::info!("[{job_id}] Processing {}", source.path().display());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(&job_id, source.path(), &cancel, factory)
    }));

    if let Err(e) = source.release() {
        log::warn!(
            "[{job_id}] Failed to remove {}: {e}",
            source.path().display()
        );
    }
    tokens
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&job_id);

    let transition = match outcome {
        Ok(Ok(result)) => {
            log::info!(
                "[{job_id}] Completed: {} frame(s) selected from {} scanned",
                result.frames.len(),
                result.frames_scanned
            );
            registry.complete(&job_id, result)
        }
        Ok(Err(e)) => {
            log::warn!("[{job_id}] Failed: {e}");
            registry.fail(&job_id, e.to_string())
        }
        Err(payload) => {
            let message = format!("pipeline panicked: {}", panic_message(payload.as_ref()));
            log::error!("[{job_id}] {message}");
            registry.fail(&job_id, message)
        }
    };
    if let Err(e) = transition {
        log::error!("[{job_id}] {e}");
    }
}

fn execute(
    job_id: &str,
    path: &Path,
    cancel: &CancellationToken,
    factory: &dyn PipelineFactory,
) -> Result<SelectionOutcome, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let mut pipeline = factory.create(path)?;
    let mut logger = LogPipelineLogger::new(job_id, PROGRESS_LOG_INTERVAL);
    pipeline.execute(job_id, path, cancel, &mut logger)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
