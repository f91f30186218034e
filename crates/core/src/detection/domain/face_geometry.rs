use std::collections::BTreeSet;

use thiserror::Error;

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::frame::Frame;
use crate::shared::region::BoundingBox;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model produced unusable output: {0}")]
    InvalidOutput(String),
}

impl From<ort::Error> for ExtractionError {
    fn from(e: ort::Error) -> Self {
        ExtractionError::Inference(e.to_string())
    }
}

/// One face found in a frame: its box and its 68 landmarks, both in the
/// pixel coordinates of that frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    pub bounds: BoundingBox,
    pub landmarks: FaceLandmarks,
}

/// Domain interface for locating faces and their landmarks.
///
/// Takes `&mut self` so implementations can hold inference sessions and
/// per-frame caches.
pub trait FaceGeometryExtractor: Send {
    fn extract(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractionError>;

    /// Only `frame_indices` will be extracted again in this job; per-frame
    /// state for any other frame can be dropped.
    fn retain_frames(&mut self, _frame_indices: &BTreeSet<usize>) {}
}
