use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Integer face location in the coordinate space the box was detected in.
    pub fn location(&self) -> FaceLocation {
        FaceLocation {
            top: self.y.round() as i32,
            right: (self.x + self.width).round() as i32,
            bottom: (self.y + self.height).round() as i32,
            left: self.x.round() as i32,
        }
    }

    /// Intersection over union; 0.0 when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let overlap_w = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let overlap_h = ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let overlap = overlap_w * overlap_h;
        let union = self.width * self.height + other.width * other.height - overlap;
        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

/// Face rectangle as (top, right, bottom, left) pixel edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl FaceLocation {
    /// Multiply all four edges by `factor`.
    pub fn scaled(&self, factor: i32) -> Self {
        Self {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// An enrolled identity: a display name and the embedding it is matched by.
///
/// Names are not unique; two enrollments of "Ada" are two identities.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub name: String,
    pub embedding: Embedding,
}

impl Identity {
    pub fn new(name: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            name: name.into(),
            embedding,
        }
    }
}

/// Display text for faces that matched no enrolled identity.
pub const UNKNOWN_NAME: &str = "Unknown";

/// A located face and the identity it matched, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub location: FaceLocation,
    /// `None` is the unknown sentinel.
    pub name: Option<String>,
}

impl Detection {
    pub fn is_known(&self) -> bool {
        self.name.is_some()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    /// Index into `gallery` of the identity the probe matches, if any.
    fn find(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> Option<usize>;
}

/// Cosine matcher returning the earliest-enrolled identity that clears the threshold.
///
/// There is no best-score tie-break: when several identities match, the first
/// registered wins.
pub struct FirstMatch;

impl Matcher for FirstMatch {
    fn find(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> Option<usize> {
        gallery
            .iter()
            .position(|identity| probe.similarity(&identity.embedding) >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, values: Vec<f32>) -> Identity {
        Identity::new(name, Embedding::new(values))
    }

    fn square(x: f32, y: f32, size: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: size,
            height: size,
            confidence: 1.0,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou() {
        let a = square(0.0, 0.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        // Half overlap: 50 / (100 + 100 - 50).
        assert!((a.iou(&square(5.0, 0.0, 10.0)) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(a.iou(&square(20.0, 20.0, 10.0)), 0.0);
        assert_eq!(square(0.0, 0.0, 0.0).iou(&square(0.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_first_match_prefers_enrollment_order() {
        // Both "close" and "exact" clear the threshold; "close" was enrolled first.
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            identity("decoy", vec![0.0, 1.0, 0.0]),
            identity("close", vec![0.9, 0.1, 0.0]),
            identity("exact", vec![1.0, 0.0, 0.0]),
        ];

        assert_eq!(FirstMatch.find(&probe, &gallery, 0.5), Some(1));
    }

    #[test]
    fn test_first_match_duplicate_names() {
        let probe = Embedding::new(vec![0.0, 1.0]);
        let gallery = vec![
            identity("Ada", vec![1.0, 0.0]),
            identity("Ada", vec![0.0, 1.0]),
        ];
        assert_eq!(FirstMatch.find(&probe, &gallery, 0.5), Some(1));
    }

    #[test]
    fn test_first_match_none_below_threshold() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![identity("other", vec![0.0, 1.0, 0.0])];
        assert_eq!(FirstMatch.find(&probe, &gallery, 0.5), None);
    }

    #[test]
    fn test_first_match_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(FirstMatch.find(&probe, &[], 0.5), None);
    }

    #[test]
    fn test_location_scaled_by_four() {
        let loc = FaceLocation { top: 10, right: 40, bottom: 50, left: 5 };
        let big = loc.scaled(4);
        assert_eq!(big, FaceLocation { top: 40, right: 160, bottom: 200, left: 20 });
    }

    #[test]
    fn test_bbox_location_rounds_edges() {
        let bbox = BoundingBox {
            x: 10.4, y: 20.6, width: 30.0, height: 40.0,
            confidence: 0.9, landmarks: None,
        };
        assert_eq!(
            bbox.location(),
            FaceLocation { top: 21, right: 40, bottom: 61, left: 10 }
        );
    }

    #[test]
    fn test_detection_label() {
        let loc = FaceLocation { top: 0, right: 1, bottom: 1, left: 0 };
        let known = Detection { location: loc, name: Some("Ada".into()) };
        let unknown = Detection { location: loc, name: None };
        assert!(known.is_known());
        assert_eq!(known.label(), "Ada");
        assert!(!unknown.is_known());
        assert_eq!(unknown.label(), UNKNOWN_NAME);
    }
}
