pub mod model_resolver;
pub mod onnx_face_detector;
pub mod onnx_person_detector;
