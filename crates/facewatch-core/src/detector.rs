//! SCRFD face detector via ONNX Runtime.
//!
//! SCRFD is anchor-free over three feature strides; each stride emits a score,
//! a box-distance and a five-point landmark head. Frames are letterboxed into
//! the square model input and detections are mapped back to frame pixels.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = SCRFD_STRIDES.len() * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Where a frame landed inside the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    /// Resized frame size inside the input.
    inner_w: usize,
    inner_h: usize,
}

impl Letterbox {
    fn fit(frame_w: u32, frame_h: u32, input_w: usize, input_h: usize) -> Self {
        let scale = (input_w as f32 / frame_w as f32).min(input_h as f32 / frame_h as f32);
        let inner_w = ((frame_w as f32 * scale).round() as usize).clamp(1, input_w);
        let inner_h = ((frame_h as f32 * scale).round() as usize).clamp(1, input_h);
        Self {
            scale,
            offset_x: (input_w - inner_w) as f32 / 2.0,
            offset_y: (input_h - inner_h) as f32 / 2.0,
            inner_w,
            inner_h,
        }
    }

    /// Model-input point back to frame pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }
}

/// Positions of the three heads of one stride in the session outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideHeads {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    heads: [StrideHeads; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = %model_path.display(), outputs = ?output_names, "loaded SCRFD model");

        if output_names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), got {}",
                output_names.len()
            )));
        }

        let heads = resolve_heads(&output_names);
        tracing::debug!(?heads, "SCRFD output heads");

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
            heads,
        })
    }

    /// Faces in an RGB frame, highest confidence first, in frame pixel coordinates.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let fit = Letterbox::fit(frame.width(), frame.height(), self.input_size, self.input_size);
        let input = to_input_tensor(frame, &fit, self.input_size);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (heads, &stride) in self.heads.iter().zip(SCRFD_STRIDES.iter()) {
            let head = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} head, stride {stride}: {e}")))
            };
            let level = StrideLevel {
                stride,
                grid_w: self.input_size / stride,
                scores: head(heads.score, "score")?,
                boxes: head(heads.bbox, "bbox")?,
                kps: head(heads.kps, "kps")?,
            };
            candidates.extend(level.decode(&fit, SCRFD_CONFIDENCE_THRESHOLD));
        }

        Ok(suppress_overlaps(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Resize into the letterbox and lay out as normalized NCHW, RGB order.
///
/// Padding gets the mean value so it normalizes to zero.
fn to_input_tensor(frame: &RgbImage, fit: &Letterbox, size: usize) -> Array4<f32> {
    let resized = imageops::resize(frame, fit.inner_w as u32, fit.inner_h as u32, FilterType::Triangle);
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    let (x0, y0) = (fit.offset_x.floor() as usize, fit.offset_y.floor() as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        for (c, &value) in pixel.0.iter().enumerate() {
            tensor[[0, c, y0 + y as usize, x0 + x as usize]] = (value as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    tensor
}

/// Map output heads to strides.
///
/// Exports either name their heads `score_8`, `bbox_16`, `kps_32`, ... or use
/// opaque numeric names in the order scores, boxes, landmarks.
fn resolve_heads(names: &[String]) -> [StrideHeads; 3] {
    let index_of = |head: &str, stride: usize| {
        let wanted = format!("{head}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named = |stride: usize| -> Option<StrideHeads> {
        Some(StrideHeads {
            score: index_of("score", stride)?,
            bbox: index_of("bbox", stride)?,
            kps: index_of("kps", stride)?,
        })
    };

    match (named(SCRFD_STRIDES[0]), named(SCRFD_STRIDES[1]), named(SCRFD_STRIDES[2])) {
        (Some(a), Some(b), Some(c)) => [a, b, c],
        _ => {
            tracing::info!(?names, "SCRFD output names not recognized; using positional heads");
            std::array::from_fn(|level| StrideHeads {
                score: level,
                bbox: level + SCRFD_STRIDES.len(),
                kps: level + 2 * SCRFD_STRIDES.len(),
            })
        }
    }
}

/// Raw head outputs for one stride.
struct StrideLevel<'a> {
    stride: usize,
    grid_w: usize,
    scores: &'a [f32],
    boxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideLevel<'_> {
    /// Anchors scoring above `threshold`, in frame pixels.
    fn decode(&self, fit: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let step = self.stride as f32;

        self.scores
            .iter()
            .enumerate()
            .filter(|&(_, &score)| score > threshold)
            .filter_map(|(anchor, &score)| {
                let dist = self.boxes.get(anchor * 4..anchor * 4 + 4)?;
                let cell = anchor / SCRFD_ANCHORS_PER_CELL;
                let cx = (cell % self.grid_w) as f32 * step;
                let cy = (cell / self.grid_w) as f32 * step;

                let (left, top) = fit.unmap(cx - dist[0] * step, cy - dist[1] * step);
                let (right, bottom) = fit.unmap(cx + dist[2] * step, cy + dist[3] * step);

                let landmarks = self.kps.get(anchor * 10..anchor * 10 + 10).map(|pts| {
                    std::array::from_fn(|i| fit.unmap(cx + pts[2 * i] * step, cy + pts[2 * i + 1] * step))
                });

                Some(BoundingBox {
                    x: left,
                    y: top,
                    width: right - left,
                    height: bottom - top,
                    confidence: score,
                    landmarks,
                })
            })
            .collect()
    }
}

/// Greedy NMS; survivors come back highest confidence first.
fn suppress_overlaps(mut candidates: Vec<BoundingBox>, max_iou: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= max_iou) {
            kept.push(candidate);
        }
    }
    kept
}
