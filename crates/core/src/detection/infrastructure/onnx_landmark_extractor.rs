/// Two-stage face geometry: YOLO boxes, then a 68-point landmark regressor
/// run on a square crop around each box.
///
/// The landmark model takes an NCHW RGB crop scaled to `[0, 1]` and emits
/// 136 values, `[x0, y0, ..., x67, y67]`, either normalized to the crop
/// (PFLD-style) or in model-input pixels. Both conventions are accepted.
use std::path::Path;

use crate::detection::domain::face_geometry::{
    DetectedFace, ExtractionError, FaceGeometryExtractor,
};
use crate::detection::domain::face_landmarks::{FaceLandmarks, NUM_LANDMARKS};
use crate::shared::frame::Frame;
use crate::shared::region::BoundingBox;

use super::execution_provider::{build_session, input_hw};
use super::onnx_face_detector::OnnxFaceDetector;

const DEFAULT_INPUT_SIZE: u32 = 112;

/// Detector boxes hug the face; the regressor wants some forehead and chin.
const CROP_SCALE: f64 = 1.2;

/// Outputs whose magnitude stays under this are treated as crop-normalized.
const NORMALIZED_LIMIT: f32 = 2.0;

pub struct OnnxLandmarkExtractor {
    detector: OnnxFaceDetector,
    session: ort::session::Session,
    input_w: u32,
    input_h: u32,
}

impl OnnxLandmarkExtractor {
    pub fn new(
        detector: OnnxFaceDetector,
        landmark_model_path: &Path,
        concurrent_jobs: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(landmark_model_path, concurrent_jobs)?;
        let (input_h, input_w) =
            input_hw(&session).unwrap_or((DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE));
        Ok(Self {
            detector,
            session,
            input_w,
            input_h,
        })
    }

    fn landmarks_for(
        &mut self,
        frame: &Frame,
        bounds: &BoundingBox,
    ) -> Result<Option<FaceLandmarks>, ExtractionError> {
        let Some(region) = bounds
            .expanded_square(CROP_SCALE)
            .clamped(frame.width(), frame.height())
        else {
            return Ok(None);
        };
        let Some(crop) = frame.crop(&region) else {
            return Ok(None);
        };

        let tensor = preprocess(&crop, self.input_w, self.input_h);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(ExtractionError::InvalidOutput(
                "landmark model produced no outputs".into(),
            ));
        }
        let array = outputs[0].try_extract_array::<f32>()?;
        let values: Vec<f32> = array.iter().copied().collect();
        if values.len() != NUM_LANDMARKS * 2 {
            return Err(ExtractionError::InvalidOutput(format!(
                "expected {} landmark values, got {}",
                NUM_LANDMARKS * 2,
                values.len()
            )));
        }

        Ok(to_frame_coords(&values, &region, self.input_w, self.input_h))
    }
}

impl FaceGeometryExtractor for OnnxLandmarkExtractor {
    fn extract(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractionError> {
        let boxes = self.detector.detect(frame)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for face_box in boxes {
            match self.landmarks_for(frame, &face_box.bounds)? {
                Some(landmarks) => faces.push(DetectedFace {
                    bounds: face_box.bounds,
                    landmarks,
                }),
                None => log::debug!(
                    "Frame {}: no usable landmarks for face at {:?}",
                    frame.index(),
                    face_box.bounds
                ),
            }
        }
        Ok(faces)
    }
}

/// Resize crop to the model input, scale to [0, 1], NCHW layout.
fn preprocess(crop: &Frame, input_w: u32, input_h: u32) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let (dst_w, dst_h) = (input_w as usize, input_h as usize);

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, dst_h, dst_w));
    for y in 0..dst_h {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / dst_h as f64) as usize).min(src_h - 1);
        for x in 0..dst_w {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / dst_w as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Maps raw model output back into frame pixels.
fn to_frame_coords(
    values: &[f32],
    region: &BoundingBox,
    input_w: u32,
    input_h: u32,
) -> Option<FaceLandmarks> {
    let normalized = values.iter().all(|v| v.abs() <= NORMALIZED_LIMIT);
    let (unit_x, unit_y) = if normalized {
        (region.width as f64, region.height as f64)
    } else {
        (
            region.width as f64 / input_w as f64,
            region.height as f64 / input_h as f64,
        )
    };
    let flat: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    FaceLandmarks::from_flat(&flat).map(|lm| {
        lm.map(|(x, y)| {
            (
                region.x as f64 + x * unit_x,
                region.y as f64 + y * unit_y,
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_preprocess_shape_and_range() {
        let crop = Frame::new(vec![255u8; 40 * 30 * 3], 40, 30, 0);
        let tensor = preprocess(&crop, 112, 112);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!(tensor.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_normalized_output_maps_into_region() {
        let mut values = vec![0.5f32; 136];
        values[0] = 0.0;
        values[1] = 1.0;
        let region = BoundingBox::new(100, 200, 50, 80);
        let lm = to_frame_coords(&values, &region, 112, 112).unwrap();
        assert_relative_eq!(lm.point(0).0, 100.0);
        assert_relative_eq!(lm.point(0).1, 280.0);
        assert_relative_eq!(lm.point(1).0, 125.0);
        assert_relative_eq!(lm.point(1).1, 240.0);
    }

    #[test]
    fn test_pixel_output_maps_into_region() {
        let mut values = vec![56.0f32; 136];
        values[0] = 112.0;
        let region = BoundingBox::new(10, 10, 224, 224);
        let lm = to_frame_coords(&values, &region, 112, 112).unwrap();
        assert_relative_eq!(lm.point(0).0, 234.0);
        assert_relative_eq!(lm.point(0).1, 122.0);
    }

    #[test]
    fn test_nan_output_is_rejected() {
        let mut values = vec![0.5f32; 136];
        values[3] = f32::NAN;
        let region = BoundingBox::new(0, 0, 10, 10);
        assert!(to_frame_coords(&values, &region, 112, 112).is_none());
    }
}
