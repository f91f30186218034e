use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("job id {0:?} is not a valid directory name")]
    InvalidJobId(String),
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload rejected with status {status}: {body}")]
    Upload { status: u16, body: String },
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where a qualifying frame ended up.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredFrame {
    pub frame_index: usize,
    /// File path or remote object reference, as reported by the sink.
    pub location: String,
}

/// Persists qualifying frames for a job.
///
/// Sinks are shared by every running job, hence `&self` and `Sync`.
pub trait FrameSink: Send + Sync {
    fn store(&self, job_id: &str, frame: &Frame) -> Result<StoredFrame, StoreError>;
}
