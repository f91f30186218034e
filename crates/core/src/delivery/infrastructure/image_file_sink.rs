use std::path::{Path, PathBuf};

use crate::delivery::domain::frame_sink::{FrameSink, StoreError, StoredFrame};
use crate::shared::frame::Frame;
use crate::shared::path_segment::is_single_segment;

use super::jpeg::{encode_jpeg, frame_file_name};

/// Writes qualifying frames as JPEG files under `<root>/<job_id>/`.
pub struct ImageFileSink {
    root: PathBuf,
}

impl ImageFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FrameSink for ImageFileSink {
    fn store(&self, job_id: &str, frame: &Frame) -> Result<StoredFrame, StoreError> {
        if !is_single_segment(job_id) {
            return Err(StoreError::InvalidJobId(job_id.to_string()));
        }
        let dir = self.root.join(job_id);
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(frame_file_name(frame.index()));
        let bytes = encode_jpeg(frame)?;
        std::fs::write(&path, bytes).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(StoredFrame {
            frame_index: frame.index(),
            location: path.to_string_lossy().into_owned(),
        })
    }
}
