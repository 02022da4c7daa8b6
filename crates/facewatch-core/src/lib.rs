//! facewatch-core: Face recognition, enrollment and recognition logging.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime for CPU inference, plus the per-frame pipeline
//! that turns camera frames into annotated frames and log rows.

pub mod alignment;
pub mod analyzer;
pub mod config;
pub mod detector;
pub mod duty_cycle;
pub mod overlay;
pub mod pipeline;
pub mod recognition_log;
pub mod recognizer;
pub mod store;
pub mod types;

pub use analyzer::{enroll_from_image, EnrollError, FaceAnalyzer, OnnxAnalyzer, SharedAnalyzer};
pub use config::Config;
pub use pipeline::{AnnotatedFrame, FrameProcessor};
pub use recognition_log::RecognitionLog;
pub use store::EnrollmentStore;
pub use types::{BoundingBox, Detection, Embedding, FaceLocation, Identity};
