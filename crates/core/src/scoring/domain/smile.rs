use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model produced unusable output: {0}")]
    InvalidOutput(String),
}

impl From<ort::Error> for ClassifierError {
    fn from(e: ort::Error) -> Self {
        ClassifierError::Inference(e.to_string())
    }
}

/// How many faces a classifier could judge in a frame, and how many of
/// those were smiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmileCount {
    pub valid_face_count: usize,
    pub smiling_face_count: usize,
}

impl SmileCount {
    /// A frame qualifies when at least one face was judged and the smiling
    /// share reaches `threshold`.
    pub fn qualifies(&self, threshold: f64) -> bool {
        self.valid_face_count > 0
            && self.smiling_face_count as f64 / self.valid_face_count as f64 >= threshold
    }
}

/// Domain interface for judging smiles across all faces in a frame.
pub trait SmileClassifier: Send {
    fn classify(&mut self, frame: &Frame) -> Result<SmileCount, ClassifierError>;
}
