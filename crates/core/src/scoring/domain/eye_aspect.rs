use crate::detection::domain::face_geometry::DetectedFace;

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Eye-aspect ratio of one eye contour `p1..p6`:
/// `(|p2 - p6| + |p3 - p5|) / (2 |p1 - p4|)`.
///
/// Returns `None` for a degenerate eye whose corners coincide.
pub fn eye_aspect_ratio(eye: &[(f64, f64); 6]) -> Option<f64> {
    let width = distance(eye[0], eye[3]);
    if width <= f64::EPSILON || !width.is_finite() {
        return None;
    }
    let height = distance(eye[1], eye[5]) + distance(eye[2], eye[4]);
    Some(height / (2.0 * width))
}

/// Mean EAR over both eyes of every face in a frame.
///
/// Returns `None` when no face yields a measurable eye.
pub fn mean_eye_aspect_ratio(faces: &[DetectedFace]) -> Option<f64> {
    let ratios: Vec<f64> = faces
        .iter()
        .flat_map(|f| [f.landmarks.right_eye(), f.landmarks.left_eye()])
        .filter_map(|eye| eye_aspect_ratio(&eye))
        .collect();
    if ratios.is_empty() {
        return None;
    }
    Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
}
