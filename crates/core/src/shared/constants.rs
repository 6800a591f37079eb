pub const FACE_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/facetrace/facetrace/releases/download/v0.1.0/blazeface_short_range.onnx";

pub const PERSON_MODEL_NAME: &str = "yolov8n_person.onnx";
pub const PERSON_MODEL_URL: &str =
    "https://github.com/facetrace/facetrace/releases/download/v0.1.0/yolov8n_person.onnx";

/// Substituted when the location provider fails or is absent.
pub const PLACEHOLDER_LOCATION: &str = "0.0,0.0";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
