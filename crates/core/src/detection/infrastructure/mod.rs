pub mod execution_provider;
pub mod latest_frame_source;
pub mod onnx_face_mesh_backend;
