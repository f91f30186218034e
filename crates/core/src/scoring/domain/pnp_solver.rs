//! Perspective-n-point pose estimation for a pinhole camera without lens
//! distortion.
//!
//! A linear DLT estimate seeds Levenberg-Marquardt refinement of the
//! reprojection error over a rotation vector and translation.

use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};

const MAX_ITERATIONS: usize = 100;
const STEP_TOLERANCE: f64 = 1e-10;
const COST_TOLERANCE: f64 = 1e-12;
const JACOBIAN_STEP: f64 = 1e-6;
const MIN_POINTS: usize = 4;

/// Pinhole intrinsics: one focal length in pixels and the principal point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsics {
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Approximates an uncalibrated camera: focal length equal to the frame
    /// width and the principal point at the frame center.
    pub fn from_frame_size(width: u32, height: u32) -> Self {
        Self {
            focal: width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Projects a camera-space point to pixels. `None` behind the camera.
    pub fn project(&self, p: &Vector3<f64>) -> Option<(f64, f64)> {
        if p.z <= f64::EPSILON {
            return None;
        }
        Some((
            self.focal * p.x / p.z + self.cx,
            self.focal * p.y / p.z + self.cy,
        ))
    }
}

#[derive(Clone, Debug)]
pub struct PoseSolution {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// Root-mean-square reprojection error in pixels.
    pub rms_error: f64,
}

/// Estimates the pose mapping `model` points into the camera frame so that
/// they project onto `image` points.
///
/// Returns `None` for degenerate input or when no solution with the object
/// in front of the camera is found.
pub fn solve_pnp(
    model: &[Vector3<f64>],
    image: &[(f64, f64)],
    camera: &CameraIntrinsics,
) -> Option<PoseSolution> {
    if model.len() != image.len() || model.len() < MIN_POINTS || camera.focal <= 0.0 {
        return None;
    }
    let finite = model.iter().all(|p| p.iter().all(|v| v.is_finite()))
        && image.iter().all(|(x, y)| x.is_finite() && y.is_finite());
    if !finite {
        return None;
    }

    let initial = dlt_initial_pose(model, image, camera)
        .unwrap_or_else(|| fallback_initial_pose(model, image, camera));
    let params = refine(initial, model, image, camera)?;

    let rotation = Rotation3::from_scaled_axis(Vector3::new(params[0], params[1], params[2]));
    let translation = Vector3::new(params[3], params[4], params[5]);
    if translation.z <= 0.0 || !translation.iter().all(|v| v.is_finite()) {
        return None;
    }
    let r = residuals(&params, model, image, camera)?;
    Some(PoseSolution {
        rotation,
        translation,
        rms_error: (r.norm_squared() / model.len() as f64).sqrt(),
    })
}

type Params = [f64; 6];

fn to_params(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Params {
    let axis = rotation.scaled_axis();
    [
        axis.x,
        axis.y,
        axis.z,
        translation.x,
        translation.y,
        translation.z,
    ]
}

/// Linear estimate from the 2n x 12 DLT system on normalized coordinates.
fn dlt_initial_pose(
    model: &[Vector3<f64>],
    image: &[(f64, f64)],
    camera: &CameraIntrinsics,
) -> Option<Params> {
    if model.len() < 6 {
        return None;
    }
    let n = model.len();
    let centroid = model.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n as f64;
    let spread = model.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n as f64;
    if spread <= f64::EPSILON {
        return None;
    }

    let mut a = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, (p, (x, y))) in model.iter().zip(image).enumerate() {
        let q = (p - centroid) / spread;
        let u = (x - camera.cx) / camera.focal;
        let v = (y - camera.cy) / camera.focal;
        let h = [q.x, q.y, q.z, 1.0];
        for k in 0..4 {
            a[(2 * i, k)] = h[k];
            a[(2 * i, 8 + k)] = -u * h[k];
            a[(2 * i + 1, 4 + k)] = h[k];
            a[(2 * i + 1, 8 + k)] = -v * h[k];
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let p = v_t.row(min_idx);

    // Undo the model normalization: P = P' * [I/s, -c/s; 0, 1].
    let m_norm = Matrix3::new(p[0], p[1], p[2], p[4], p[5], p[6], p[8], p[9], p[10]);
    let mut m = m_norm / spread;
    let mut p4 = Vector3::new(p[3], p[7], p[11]) - m * centroid;

    if m.determinant() < 0.0 {
        m = -m;
        p4 = -p4;
    }

    let m_svd = m.svd(true, true);
    let (u, v_t) = (m_svd.u?, m_svd.v_t?);
    let scale = m_svd.singular_values.sum() / 3.0;
    if scale <= f64::EPSILON {
        return None;
    }
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let fix = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        r = u * fix * v_t;
    }
    let translation = p4 / scale;
    if translation.z <= 0.0 {
        return None;
    }
    Some(to_params(
        &Rotation3::from_matrix_unchecked(r),
        &translation,
    ))
}

/// Identity rotation, depth guessed from the ratio of model to image extent.
fn fallback_initial_pose(
    model: &[Vector3<f64>],
    image: &[(f64, f64)],
    camera: &CameraIntrinsics,
) -> Params {
    let n = model.len() as f64;
    let (mx, my) = image
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x / n, ay + y / n));
    let model_centroid = model.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;
    let model_extent = model
        .iter()
        .map(|p| (p - model_centroid).xy().norm())
        .sum::<f64>()
        / n;
    let image_extent = image
        .iter()
        .map(|(x, y)| ((x - mx).powi(2) + (y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let z = if image_extent > f64::EPSILON {
        camera.focal * model_extent / image_extent
    } else {
        camera.focal
    };
    let tx = (mx - camera.cx) * z / camera.focal - model_centroid.x;
    let ty = (my - camera.cy) * z / camera.focal - model_centroid.y;
    [0.0, 0.0, 0.0, tx, ty, z.max(1.0)]
}

fn residuals(
    params: &Params,
    model: &[Vector3<f64>],
    image: &[(f64, f64)],
    camera: &CameraIntrinsics,
) -> Option<DVector<f64>> {
    let rotation = Rotation3::from_scaled_axis(Vector3::new(params[0], params[1], params[2]));
    let translation = Vector3::new(params[3], params[4], params[5]);
    let mut r = DVector::zeros(2 * model.len());
    for (i, (p, (x, y))) in model.iter().zip(image).enumerate() {
        let (px, py) = camera.project(&(rotation * p + translation))?;
        r[2 * i] = px - x;
        r[2 * i + 1] = py - y;
    }
    Some(r)
}

fn jacobian(
    params: &Params,
    model: &[Vector3<f64>],
    image: &[(f64, f64)],
    camera: &CameraIntrinsics,
) -> Option<DMatrix<f64>> {
    let mut j = DMatrix::zeros(2 * model.len(), 6);
    for k in 0..6 {
        let h = JACOBIAN_STEP * params[k].abs().max(1.0);
        let mut plus = *params;
        let mut minus = *params;
        plus[k] += h;
        minus[k] -= h;
        let column = (residuals(&plus, model, image, camera)?
            - residuals(&minus, model, image, camera)?)
            / (2.0 * h);
        j.set_column(k, &column);
    }
    Some(j)
}

/// Levenberg-Marquardt on the pixel reprojection error.
fn refine(
    initial: Params,
    model: &[Vector3<f64>],
    image: &[(f64, f64)],
    camera: &CameraIntrinsics,
) -> Option<Params> {
    let mut params = initial;
    let mut r = residuals(&params, model, image, camera)?;
    let mut cost = r.norm_squared();
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        let j = jacobian(&params, model, image, camera)?;
        let jt = j.transpose();
        let jtj = &jt * &j;
        let gradient = &jt * &r;

        let mut damped = jtj.clone();
        for i in 0..6 {
            damped[(i, i)] += lambda * jtj[(i, i)].max(1e-9);
        }
        let Some(delta) = damped.lu().solve(&(-gradient.clone())) else {
            lambda *= 10.0;
            continue;
        };

        let mut candidate = params;
        for i in 0..6 {
            candidate[i] += delta[i];
        }

        match residuals(&candidate, model, image, camera) {
            Some(next_r) if next_r.norm_squared() < cost => {
                let next_cost = next_r.norm_squared();
                let converged = delta.norm() < STEP_TOLERANCE
                    || (cost - next_cost) <= COST_TOLERANCE * cost.max(1.0);
                params = candidate;
                r = next_r;
                cost = next_cost;
                lambda = (lambda / 10.0).max(1e-12);
                if converged {
                    break;
                }
            }
            _ => {
                lambda *= 10.0;
                if lambda > 1e12 {
                    break;
                }
            }
        }
    }

    if params.iter().all(|v| v.is_finite()) {
        Some(params)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn face_model() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(-30.0, -125.0, -30.0),
            Vector3::new(30.0, -125.0, -30.0),
            Vector3::new(-60.0, -70.0, -60.0),
            Vector3::new(60.0, -70.0, -60.0),
            Vector3::new(-40.0, 40.0, -50.0),
            Vector3::new(40.0, 40.0, -50.0),
        ]
    }

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::from_frame_size(1000, 1000)
    }

    fn project_all(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Vec<(f64, f64)> {
        face_model()
            .iter()
            .map(|p| camera().project(&(rotation * p + translation)).unwrap())
            .collect()
    }

    #[test]
    fn test_intrinsics_from_frame_size() {
        let cam = CameraIntrinsics::from_frame_size(1000, 562);
        assert_relative_eq!(cam.focal, 1000.0);
        assert_relative_eq!(cam.cx, 500.0);
        assert_relative_eq!(cam.cy, 281.0);
    }

    #[test]
    fn test_recovers_known_pose() {
        let rotation = Rotation3::from_euler_angles(0.15, -0.3, 0.05);
        let translation = Vector3::new(20.0, -10.0, 1000.0);
        let image = project_all(&rotation, &translation);

        let solution = solve_pnp(&face_model(), &image, &camera()).unwrap();

        assert!(solution.rms_error < 1e-3);
        assert!(solution.rotation.angle_to(&rotation) < 1e-4);
        assert!((solution.translation - translation).norm() < 1e-2);
    }

    #[test]
    fn test_recovers_identity_pose() {
        let rotation = Rotation3::identity();
        let translation = Vector3::new(0.0, 0.0, 800.0);
        let image = project_all(&rotation, &translation);

        let solution = solve_pnp(&face_model(), &image, &camera()).unwrap();
        assert!(solution.rotation.angle() < 1e-4);
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let image = vec![(0.0, 0.0); 5];
        assert!(solve_pnp(&face_model(), &image, &camera()).is_none());
    }

    #[test]
    fn test_rejects_too_few_points() {
        let model = face_model()[..3].to_vec();
        let image = vec![(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)];
        assert!(solve_pnp(&model, &image, &camera()).is_none());
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let mut image = project_all(&Rotation3::identity(), &Vector3::new(0.0, 0.0, 900.0));
        image[2].0 = f64::NAN;
        assert!(solve_pnp(&face_model(), &image, &camera()).is_none());
    }

    #[test]
    fn test_fallback_initial_pose_is_in_front_of_camera() {
        let image = project_all(&Rotation3::identity(), &Vector3::new(0.0, 0.0, 900.0));
        let params = fallback_initial_pose(&face_model(), &image, &camera());
        assert!(params[5] > 0.0);
    }
}
