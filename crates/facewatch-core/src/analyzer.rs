//! The recognition seam: locate faces, then encode them.
//!
//! [`FaceAnalyzer`] is what the capture pipeline and enrollment talk to.
//! [`OnnxAnalyzer`] backs it with the SCRFD detector and ArcFace recognizer.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// SCRFD model filename inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace model filename inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("analyzer lock poisoned by a panicked thread")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face found in {0}")]
    NoFace(PathBuf),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

/// Face location and embedding extraction over RGB frames.
pub trait FaceAnalyzer {
    /// Find faces, highest confidence first, in `frame` pixel coordinates.
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzerError>;

    /// One embedding per face in `faces`, in the same order.
    fn encode(&mut self, frame: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, AnalyzerError>;
}

/// Analyzer shared between the capture thread and enrollment.
pub type SharedAnalyzer = Arc<Mutex<dyn FaceAnalyzer + Send>>;

/// ONNX Runtime analyzer: SCRFD for location, ArcFace for encoding.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), "face models loaded");
        Ok(Self { detector, recognizer })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzerError> {
        Ok(self.detector.detect(frame)?)
    }

    fn encode(&mut self, frame: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, AnalyzerError> {
        faces
            .iter()
            .map(|face| self.recognizer.extract(frame, face).map_err(AnalyzerError::from))
            .collect()
    }
}

/// Load a still image and return the embedding of its first detected face.
///
/// An unreadable file, a decode failure and an image without a face are all
/// enrollment failures; the caller does not need to tell them apart.
pub fn enroll_from_image<A>(analyzer: &mut A, path: &Path) -> Result<Embedding, EnrollError>
where
    A: FaceAnalyzer + ?Sized,
{
    let image = image::open(path)
        .map_err(|source| EnrollError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    let faces = analyzer.locate(&image)?;
    let Some(first) = faces.first() else {
        return Err(EnrollError::NoFace(path.to_path_buf()));
    };

    let embedding = analyzer
        .encode(&image, std::slice::from_ref(first))?
        .into_iter()
        .next()
        .ok_or_else(|| EnrollError::NoFace(path.to_path_buf()))?;

    tracing::info!(
        path = %path.display(),
        faces = faces.len(),
        confidence = first.confidence,
        "enrollment embedding extracted"
    );
    Ok(embedding)
}
