pub mod face_geometry;
pub mod face_landmarks;
