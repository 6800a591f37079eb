//! facetrace-core: live-stream face detection, record extraction, and
//! identity profile clustering.
//!
//! The crate is organized per bounded context. `domain` modules hold the
//! trait seams and pure types; `infrastructure` modules hold concrete
//! backends (ffmpeg capture, ONNX detectors, file-backed stores). Use-case
//! structs in [`pipeline`] wire components together.

pub mod annotate;
pub mod capture;
pub mod detection;
pub mod extraction;
pub mod grouping;
pub mod pipeline;
pub mod shared;
pub mod store;
