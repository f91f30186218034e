use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::select_portraits_use_case::SelectionOutcome;
use crate::shared::path_segment::is_single_segment;

/// Structured result attached to a completed job.
pub type JobResult = SelectionOutcome;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job {0} already exists")]
    Duplicate(String),
    #[error("job id {0:?} must be a single path segment")]
    InvalidId(String),
    #[error("job {0} not found")]
    NotFound(String),
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("job {0} is still running")]
    Active(String),
    #[error("failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),
    #[error("job manager is shut down")]
    ShutDown,
}

/// Lifecycle of one job: `Pending -> Processing -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one accepted video and its outcome.
///
/// `completed_at` is set exactly when the status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub source_path: PathBuf,
}

impl Job {
    pub fn new(job_id: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            result: None,
            source_path: source_path.into(),
        }
    }

    /// Generate a fresh job identifier.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Job ids name per-job output directories, so they must not contain
    /// separators or parent references.
    pub fn validate_id(job_id: &str) -> Result<(), JobError> {
        if is_single_segment(job_id) {
            Ok(())
        } else {
            Err(JobError::InvalidId(job_id.to_string()))
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Processing)
    }

    pub fn complete(&mut self, result: JobResult) -> Result<(), JobError> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JobStatus::Pending, JobStatus::Processing, true)]
    #[case(JobStatus::Processing, JobStatus::Completed, true)]
    #[case(JobStatus::Processing, JobStatus::Failed, true)]
    #[case(JobStatus::Pending, JobStatus::Completed, false)]
    #[case(JobStatus::Pending, JobStatus::Failed, false)]
    #[case(JobStatus::Completed, JobStatus::Failed, false)]
    #[case(JobStatus::Failed, JobStatus::Processing, false)]
    #[case(JobStatus::Processing, JobStatus::Pending, false)]
    fn test_transitions(#[case] from: JobStatus, #[case] to: JobStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_generated_ids_are_valid() {
        assert!(Job::validate_id(&Job::new_id()).is_ok());
        assert!(matches!(
            Job::validate_id("../escaped"),
            Err(JobError::InvalidId(id)) if id == "../escaped"
        ));
    }

    #[test]
    fn test_new_job_is_pending_without_completion() {
        let job = Job::new("abc", "/tmp/abc.mp4");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_complete_sets_result_and_timestamp() {
        let mut job = Job::new("abc", "/tmp/abc.mp4");
        job.start().unwrap();
        assert!(job.completed_at.is_none());
        job.complete(JobResult::default()).unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.result.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_from_pending_is_rejected() {
        let mut job = Job::new("abc", "/tmp/abc.mp4");
        let err = job.fail("boom").unwrap_err();

        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "job abc cannot move from pending to failed");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_terminal_job_cannot_be_restarted() {
        let mut job = Job::new("abc", "/tmp/abc.mp4");
        job.start().unwrap();
        job.fail("cannot open").unwrap();
        let completed_at = job.completed_at;

        assert!(job.start().is_err());
        assert_eq!(job.completed_at, completed_at);
        assert_eq!(job.error.as_deref(), Some("cannot open"));
    }

    #[test]
    fn test_serializes_snake_case_and_omits_empty_fields() {
        let json = serde_json::to_value(Job::new("abc", "/tmp/abc.mp4")).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("completed_at").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(Job::new_id(), Job::new_id());
    }
}
