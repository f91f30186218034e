use nalgebra::{Rotation3, Vector3};

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::scoring::domain::pnp_solver::{solve_pnp, CameraIntrinsics};

/// Canonical 3D positions of the pose anchors, in the order of
/// [`POSE_ANCHORS`](crate::detection::domain::face_landmarks::POSE_ANCHORS):
/// nose tip, inner brows, inner eye corners, nose wings.
pub const FACE_MODEL_POINTS: [[f64; 3]; 7] = [
    [0.0, 0.0, 0.0],
    [-30.0, -125.0, -30.0],
    [30.0, -125.0, -30.0],
    [-60.0, -70.0, -60.0],
    [60.0, -70.0, -60.0],
    [-40.0, 40.0, -50.0],
    [40.0, 40.0, -50.0],
];

pub const MAX_FRONTAL_SCORE: f64 = 100.0;

/// Head orientation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl HeadPose {
    /// Decomposes `R = Rx(pitch) * Ry(yaw) * Rz(roll)`.
    pub fn from_rotation(rotation: &Rotation3<f64>) -> Self {
        let r = rotation.matrix();
        let sin_yaw = r[(0, 2)].clamp(-1.0, 1.0);
        let yaw = sin_yaw.asin();
        let (pitch, roll) = if sin_yaw.abs() < 1.0 - 1e-9 {
            (
                (-r[(1, 2)]).atan2(r[(2, 2)]),
                (-r[(0, 1)]).atan2(r[(0, 0)]),
            )
        } else {
            // Gimbal lock: roll folds into pitch.
            (r[(2, 1)].atan2(r[(1, 1)]), 0.0)
        };
        Self {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        }
    }

    /// Frontal-ness in `[0, 100]`: out-of-plane rotation is penalized
    /// degree for degree, in-plane roll is ignored.
    pub fn frontal_score(&self) -> f64 {
        (MAX_FRONTAL_SCORE - (self.yaw.abs() + self.pitch.abs())).max(0.0)
    }
}

/// Scores how directly a face looks at the camera.
///
/// When the pose cannot be solved the face is scored as if it were frontal
/// (zero angles). This biases ambiguous geometry towards selection instead
/// of dropping the frame.
pub struct HeadPoseScorer {
    model: Vec<Vector3<f64>>,
}

impl HeadPoseScorer {
    pub fn new() -> Self {
        Self {
            model: FACE_MODEL_POINTS
                .iter()
                .map(|p| Vector3::new(p[0], p[1], p[2]))
                .collect(),
        }
    }

    /// Estimates head pose with intrinsics derived from the frame size.
    pub fn estimate(&self, landmarks: &FaceLandmarks, frame_width: u32, frame_height: u32) -> HeadPose {
        let camera = CameraIntrinsics::from_frame_size(frame_width, frame_height);
        let image = landmarks.pose_anchors();
        match solve_pnp(&self.model, &image, &camera) {
            Some(solution) => HeadPose::from_rotation(&solution.rotation),
            None => {
                log::debug!("Pose solver did not converge, scoring face as frontal");
                HeadPose::default()
            }
        }
    }

    pub fn score(&self, landmarks: &FaceLandmarks, frame_width: u32, frame_height: u32) -> f64 {
        self.estimate(landmarks, frame_width, frame_height)
            .frontal_score()
    }
}

impl Default for HeadPoseScorer {
    fn default() -> Self {
        Self::new()
    }
}
