//! 68-point facial landmarks in the iBUG 300-W layout.
//!
//! Index ranges: jaw 0-16, brows 17-26, nose 27-35, right eye 36-41,
//! left eye 42-47, mouth 48-67. "Right" is the subject's right eye, which
//! appears on the left side of the image.

pub const NUM_LANDMARKS: usize = 68;

pub const NOSE_TIP: usize = 30;
pub const RIGHT_BROW_INNER: usize = 21;
pub const LEFT_BROW_INNER: usize = 22;
pub const RIGHT_EYE_INNER: usize = 39;
pub const LEFT_EYE_INNER: usize = 42;
pub const NOSE_RIGHT_WING: usize = 31;
pub const NOSE_LEFT_WING: usize = 35;

const RIGHT_EYE: std::ops::Range<usize> = 36..42;
const LEFT_EYE: std::ops::Range<usize> = 42..48;

/// Landmarks that anchor head-pose estimation, in the order the 3D face
/// model lists its reference points.
pub const POSE_ANCHORS: [usize; 7] = [
    NOSE_TIP,
    RIGHT_BROW_INNER,
    LEFT_BROW_INNER,
    RIGHT_EYE_INNER,
    LEFT_EYE_INNER,
    NOSE_RIGHT_WING,
    NOSE_LEFT_WING,
];

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    points: [(f64, f64); NUM_LANDMARKS],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    /// Builds landmarks from a flat `[x0, y0, x1, y1, ...]` slice.
    ///
    /// Returns `None` unless the slice holds exactly 136 finite values.
    pub fn from_flat(coords: &[f64]) -> Option<Self> {
        if coords.len() != NUM_LANDMARKS * 2 || coords.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let mut points = [(0.0, 0.0); NUM_LANDMARKS];
        for (i, p) in points.iter_mut().enumerate() {
            *p = (coords[i * 2], coords[i * 2 + 1]);
        }
        Some(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64); NUM_LANDMARKS] {
        &self.points
    }

    pub fn point(&self, index: usize) -> (f64, f64) {
        self.points[index]
    }

    pub fn pose_anchors(&self) -> [(f64, f64); 7] {
        POSE_ANCHORS.map(|i| self.points[i])
    }

    /// Six contour points of the subject's right eye, starting at the outer corner.
    pub fn right_eye(&self) -> [(f64, f64); 6] {
        let mut eye = [(0.0, 0.0); 6];
        eye.copy_from_slice(&self.points[RIGHT_EYE]);
        eye
    }

    /// Six contour points of the subject's left eye, starting at the inner corner.
    pub fn left_eye(&self) -> [(f64, f64); 6] {
        let mut eye = [(0.0, 0.0); 6];
        eye.copy_from_slice(&self.points[LEFT_EYE]);
        eye
    }

    /// Maps every point through `f`, e.g. from crop to frame coordinates.
    pub fn map(&self, f: impl Fn((f64, f64)) -> (f64, f64)) -> Self {
        Self {
            points: self.points.map(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed() -> FaceLandmarks {
        let mut points = [(0.0, 0.0); NUM_LANDMARKS];
        for (i, p) in points.iter_mut().enumerate() {
            *p = (i as f64, i as f64 * 10.0);
        }
        FaceLandmarks::new(points)
    }

    #[test]
    fn test_pose_anchors_follow_model_order() {
        let anchors = indexed().pose_anchors();
        let xs: Vec<f64> = anchors.iter().map(|p| p.0).collect();
        assert_eq!(xs, vec![30.0, 21.0, 22.0, 39.0, 42.0, 31.0, 35.0]);
    }

    #[test]
    fn test_eye_ranges() {
        let lm = indexed();
        assert_eq!(lm.right_eye()[0], (36.0, 360.0));
        assert_eq!(lm.right_eye()[5], (41.0, 410.0));
        assert_eq!(lm.left_eye()[0], (42.0, 420.0));
        assert_eq!(lm.left_eye()[5], (47.0, 470.0));
    }

    #[test]
    fn test_from_flat_requires_136_values() {
        assert!(FaceLandmarks::from_flat(&[0.0; 10]).is_none());
        let flat: Vec<f64> = (0..136).map(|v| v as f64).collect();
        let lm = FaceLandmarks::from_flat(&flat).unwrap();
        assert_eq!(lm.point(1), (2.0, 3.0));
    }

    #[test]
    fn test_from_flat_rejects_nan() {
        let mut flat = vec![1.0; 136];
        flat[7] = f64::NAN;
        assert!(FaceLandmarks::from_flat(&flat).is_none());
    }

    #[test]
    fn test_map_translates_points() {
        let lm = indexed().map(|(x, y)| (x + 100.0, y + 50.0));
        assert_eq!(lm.point(0), (100.0, 50.0));
        assert_eq!(lm.point(67), (167.0, 720.0));
    }
}
