pub const FACE_DETECTOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_DETECTOR_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// 68-point landmark regressor (PFLD-style: RGB crop in, 136 normalized
/// coordinates out). No public mirror; it must be placed in the models dir.
pub const LANDMARK_MODEL_NAME: &str = "face_landmarks_68.onnx";

pub const EMOTION_MODEL_NAME: &str = "emotion-ferplus-8.onnx";
pub const EMOTION_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx";

/// Output order of the FER+ emotion model.
pub const EMOTION_LABELS: [&str; 8] = [
    "neutral",
    "happiness",
    "surprise",
    "sadness",
    "anger",
    "disgust",
    "fear",
    "contempt",
];
pub const SMILE_LABEL: &str = "happiness";

pub const VIDEO_UPLOAD_SUFFIX: &str = ".mp4";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
