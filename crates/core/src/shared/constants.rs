pub const FACE_DETECTOR_MODEL_NAME: &str = "face_detection_short_range.onnx";
pub const FACE_MESH_MODEL_NAME: &str = "face_landmark.onnx";
/// Face mesh variant with attention-refined eye and iris landmarks.
pub const FACE_MESH_IRIS_MODEL_NAME: &str = "face_landmark_with_attention.onnx";

/// Mesh indices of the fixed anchor points used for placement.
pub const LEFT_EYE_INDEX: usize = 130;
pub const RIGHT_EYE_INDEX: usize = 359;
pub const EYE_CENTER_INDEX: usize = 168;

/// Eye distance in pixels that maps to unit overlay scale.
pub const CALIBRATION_BASELINE: f64 = 140.0;

pub const FACE_MESH_POINTS: usize = 468;
pub const FACE_MESH_IRIS_POINTS: usize = 478;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
