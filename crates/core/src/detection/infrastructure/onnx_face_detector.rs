/// YOLO face box detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, and NMS post-processing.
/// Keypoints emitted by pose variants of the model are ignored; landmark
/// regression happens in a second stage.
use std::path::Path;

use crate::detection::domain::face_geometry::ExtractionError;
use crate::shared::frame::Frame;
use crate::shared::region::BoundingBox;

use super::execution_provider::{build_session, input_hw};

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceBox {
    pub bounds: BoundingBox,
    pub confidence: f64,
}

pub struct OnnxFaceDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        confidence: f64,
        concurrent_jobs: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path, concurrent_jobs)?;
        let input_size = input_hw(&session)
            .map(|(h, _)| h)
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    /// Returns face boxes in frame coordinates, clamped to the frame and
    /// ordered by descending confidence.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, ExtractionError> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(ExtractionError::InvalidOutput(
                "YOLO model produced no outputs".into(),
            ));
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(ExtractionError::InvalidOutput(format!(
                "unexpected YOLO output shape: {shape:?}"
            )));
        }
        let data = tensor
            .as_slice()
            .ok_or_else(|| ExtractionError::InvalidOutput("non-contiguous output".into()))?;

        let raw = parse_detections(data, &shape, self.confidence, scale, pad_x, pad_y);
        Ok(nms(raw, NMS_IOU_THRESH)
            .into_iter()
            .filter_map(|d| {
                let bounds = BoundingBox::from_corners(d.x1, d.y1, d.x2, d.y2)
                    .clamped(frame.width(), frame.height())?;
                Some(FaceBox {
                    bounds,
                    confidence: d.confidence,
                })
            })
            .collect())
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // 114/255 gray padding, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Parses `[1, features, detections]` or `[1, detections, features]` output
/// rows of `[cx, cy, w, h, conf, ...]` back into frame coordinates.
fn parse_detections(
    data: &[f32],
    shape: &[usize],
    min_confidence: f64,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
) -> Vec<RawDetection> {
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Vec::new();
    }
    let at = |det: usize, feat: usize| {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    (0..num_dets)
        .filter(|&i| at(i, 4) >= min_confidence)
        .map(|i| {
            let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
            RawDetection {
                x1: ((cx - w / 2.0) - pad_x as f64) / scale,
                y1: ((cy - h / 2.0) - pad_y as f64) / scale,
                x2: ((cx + w / 2.0) - pad_x as f64) / scale,
                y2: ((cy + h / 2.0) - pad_y as f64) / scale,
                confidence: at(i, 4),
            }
        })
        .collect()
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(mut dets: Vec<RawDetection>, iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets {
        let overlaps = keep.iter().any(|k| {
            bbox_iou(&[k.x1, k.y1, k.x2, k.y2], &[det.x1, det.y1, det.x2, det.y2]) > iou_thresh
        });
        if !overlaps {
            keep.push(det);
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // Scale = min(640/200, 640/100) = 3.2, new 640x320, pad_y = 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 0);
        let (tensor, scale, pad_x, pad_y) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((scale - 3.2).abs() < 0.01);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 160);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 0);
        let (tensor, _, pad_x, pad_y) = letterbox(&frame, 640);

        let y = pad_y as usize + 1;
        let x = pad_x as usize + 1;
        assert!((tensor[[0, 0, y, x]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_detections_row_major() {
        // Two detections, 5 features each; second is below threshold.
        let data = vec![
            50.0, 50.0, 20.0, 20.0, 0.9, //
            10.0, 10.0, 4.0, 4.0, 0.1,
        ];
        let dets = parse_detections(&data, &[1, 2, 5], 0.5, 2.0, 0, 10);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].x1 - 20.0).abs() < 1e-9);
        assert!((dets[0].y1 - 15.0).abs() < 1e-9);
        assert!((dets[0].x2 - 30.0).abs() < 1e-9);
        assert!((dets[0].y2 - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_detections_transposed() {
        // [1, 5 features, 8 detections]; only detection 3 is confident.
        let mut data = vec![0.0f32; 5 * 8];
        let set = |data: &mut Vec<f32>, feat: usize, val: f32| data[feat * 8 + 3] = val;
        set(&mut data, 0, 100.0);
        set(&mut data, 1, 100.0);
        set(&mut data, 2, 10.0);
        set(&mut data, 3, 10.0);
        set(&mut data, 4, 0.8);
        let dets = parse_detections(&data, &[1, 5, 8], 0.5, 1.0, 0, 0);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].x1 - 95.0).abs() < 1e-9);
        assert!((dets[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let kept = nms(
            vec![
                det(5.0, 5.0, 105.0, 105.0, 0.8),
                det(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            0.3,
        );
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let kept = nms(
            vec![
                det(0.0, 0.0, 50.0, 50.0, 0.9),
                det(200.0, 200.0, 250.0, 250.0, 0.8),
            ],
            0.3,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(Vec::new(), 0.3).is_empty());
    }

    #[test]
    fn test_bbox_iou_no_overlap() {
        assert_eq!(
            bbox_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }
}
