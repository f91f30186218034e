pub mod eye_openness_filter;
pub mod face_track;
pub mod peak_selector;
pub mod score_smoother;
