//! Five-point face alignment.
//!
//! Fits a similarity transform (uniform scale, rotation, translation) that
//! carries detected landmarks onto the InsightFace reference positions, then
//! resamples the frame into the 112×112 crop the ArcFace encoder expects.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// InsightFace reference landmarks for a 112×112 crop:
/// left eye, right eye, nose tip, left and right mouth corners.
const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub const ALIGNED_SIZE: u32 = 112;

/// `(x, y) -> (a·x - b·y + tx, b·x + a·y + ty)`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit of `src` onto `dst`.
    ///
    /// Closed form: centre both point sets, then the rotation-scale pair is
    /// the normalised dot and cross products of the centred sets.
    fn fit(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<Self> {
        let (sx, sy) = centroid(src);
        let (dx, dy) = centroid(dst);

        let (mut dot, mut cross, mut spread) = (0.0f32, 0.0f32, 0.0f32);
        for (&(px, py), &(qx, qy)) in src.iter().zip(dst) {
            let (px, py, qx, qy) = (px - sx, py - sy, qx - dx, qy - dy);
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
            spread += px * px + py * py;
        }
        if spread < 1e-12 {
            return None;
        }

        let (a, b) = (dot / spread, cross / spread);
        Some(Self {
            a,
            b,
            tx: dx - (a * sx - b * sy),
            ty: dy - (b * sx + a * sy),
        })
    }

    #[cfg(test)]
    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// The same map as an `imageproc` projection, or `None` if it is singular.
    fn to_projection(self) -> Option<Projection> {
        Projection::from_matrix([self.a, -self.b, self.tx, self.b, self.a, self.ty, 0.0, 0.0, 1.0])
    }
}

fn centroid(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len().max(1) as f32;
    let (x, y) = points.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    (x / n, y / n)
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// Pixels that fall outside the frame, and every pixel when the landmarks
/// are degenerate, come out black.
pub fn align_face(frame: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let mut crop = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    if let Some(to_crop) = Similarity::fit(landmarks, &REFERENCE_LANDMARKS).and_then(Similarity::to_projection) {
        warp_into(frame, &to_crop, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut crop);
    }
    crop
}
