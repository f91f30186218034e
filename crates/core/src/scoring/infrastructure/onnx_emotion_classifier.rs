/// Smile classification with the FER+ emotion model.
///
/// Faces are located with the YOLO detector, cropped, converted to 64x64
/// grayscale and classified; a face counts as smiling when "happiness" is
/// its highest-scoring emotion.
use std::path::Path;

use crate::detection::infrastructure::execution_provider::{build_session, input_hw};
use crate::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use crate::scoring::domain::smile::{ClassifierError, SmileClassifier, SmileCount};
use crate::shared::constants::{EMOTION_LABELS, SMILE_LABEL};
use crate::shared::frame::Frame;

const DEFAULT_INPUT_SIZE: u32 = 64;

pub struct OnnxEmotionClassifier {
    detector: OnnxFaceDetector,
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxEmotionClassifier {
    pub fn new(
        detector: OnnxFaceDetector,
        model_path: &Path,
        concurrent_jobs: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path, concurrent_jobs)?;
        let input_size = input_hw(&session)
            .map(|(h, _)| h)
            .unwrap_or(DEFAULT_INPUT_SIZE);
        Ok(Self {
            detector,
            session,
            input_size,
        })
    }

    fn emotion_scores(&mut self, face: &Frame) -> Result<Vec<f32>, ClassifierError> {
        let tensor = grayscale_tensor(face, self.input_size);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(ClassifierError::InvalidOutput(
                "emotion model produced no outputs".into(),
            ));
        }
        let scores = outputs[0].try_extract_array::<f32>()?;
        Ok(scores.iter().copied().collect())
    }
}

impl SmileClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<SmileCount, ClassifierError> {
        let boxes = self
            .detector
            .detect(frame)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mut count = SmileCount::default();
        for face_box in boxes {
            let Some(face) = frame.crop(&face_box.bounds) else {
                continue;
            };
            let scores = self.emotion_scores(&face)?;
            count.valid_face_count += 1;
            if is_smiling(&scores)? {
                count.smiling_face_count += 1;
            }
        }
        Ok(count)
    }
}

/// True when the smile label has the highest score.
fn is_smiling(scores: &[f32]) -> Result<bool, ClassifierError> {
    if scores.len() != EMOTION_LABELS.len() {
        return Err(ClassifierError::InvalidOutput(format!(
            "expected {} emotion scores, got {}",
            EMOTION_LABELS.len(),
            scores.len()
        )));
    }
    let best = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .ok_or_else(|| ClassifierError::InvalidOutput("empty emotion scores".into()))?;
    Ok(EMOTION_LABELS[best] == SMILE_LABEL)
}

/// Luma in `[0, 255]`, resized to `size` x `size`, shape `[1, 1, size, size]`.
fn grayscale_tensor(face: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = face.as_ndarray();
    let src_w = face.width() as usize;
    let src_h = face.height() as usize;
    let n = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 1, n, n));
    for y in 0..n {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / n as f64) as usize).min(src_h - 1);
        for x in 0..n {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / n as f64) as usize).min(src_w - 1);
            let r = src[[src_y, src_x, 0]] as f32;
            let g = src[[src_y, src_x, 1]] as f32;
            let b = src[[src_y, src_x, 2]] as f32;
            tensor[[0, 0, y, x]] = 0.299 * r + 0.587 * g + 0.114 * b;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_happiness_argmax_is_smiling() {
        let scores = [0.1, 3.2, 0.4, 0.0, -1.0, 0.2, 0.3, 0.1];
        assert!(is_smiling(&scores).unwrap());
    }

    #[test]
    fn test_neutral_argmax_is_not_smiling() {
        let scores = [2.5, 2.4, 0.4, 0.0, -1.0, 0.2, 0.3, 0.1];
        assert!(!is_smiling(&scores).unwrap());
    }

    #[test]
    fn test_wrong_score_count_is_invalid_output() {
        assert!(matches!(
            is_smiling(&[0.5, 0.5]),
            Err(ClassifierError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_grayscale_tensor_uses_luma() {
        let mut data = Vec::new();
        for _ in 0..(8 * 8) {
            data.extend_from_slice(&[255, 0, 0]);
        }
        let face = Frame::new(data, 8, 8, 0);
        let tensor = grayscale_tensor(&face, 64);
        assert_eq!(tensor.shape(), &[1, 1, 64, 64]);
        assert_relative_eq!(tensor[[0, 0, 10, 10]], 0.299 * 255.0, epsilon = 1e-3);
    }
}
