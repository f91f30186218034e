pub mod execution_provider;
pub mod memoizing_extractor;
pub mod onnx_face_detector;
pub mod onnx_landmark_extractor;
