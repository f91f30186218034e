pub mod eye_aspect;
pub mod head_pose;
pub mod pnp_solver;
pub mod smile;
