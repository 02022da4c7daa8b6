//! Box-and-label overlay drawn onto full-resolution frames.

use crate::types::Detection;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const BORDER_THICKNESS: i32 = 2;
const LABEL_HEIGHT: i32 = 35;
const LABEL_PADDING: i32 = 6;
const LABEL_TEXT_SCALE: f32 = 24.0;

/// TrueType fonts tried when no label font is configured.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
];

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {0}")]
    Invalid(PathBuf),
}

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontArc, FontError> {
    let bytes = std::fs::read(path).map_err(|source| FontError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FontArc::try_from_vec(bytes).map_err(|_| FontError::Invalid(path.to_path_buf()))
}

/// The configured font, else the first system candidate that loads.
///
/// Returns `None` when nothing loads; labels are then drawn without text.
pub fn resolve_font(configured: Option<&Path>) -> Option<FontArc> {
    if let Some(path) = configured {
        match load_font(path) {
            Ok(font) => return Some(font),
            Err(e) => tracing::warn!(error = %e, "configured label font unusable"),
        }
    }
    let found = SYSTEM_FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .filter(|p| p.exists())
        .find_map(|p| load_font(p).ok());
    if found.is_none() {
        tracing::warn!("no label font found; names will not be drawn");
    }
    found
}

/// Draw every detection onto `frame`, scaling its location by `scale` first.
pub fn annotate(frame: &mut RgbImage, detections: &[Detection], scale: i32, font: Option<&FontArc>) {
    for detection in detections {
        let loc = detection.location.scaled(scale);
        let color = if detection.is_known() { KNOWN_COLOR } else { UNKNOWN_COLOR };

        for inset in 0..BORDER_THICKNESS {
            if let Some(rect) = rect_between(loc.left + inset, loc.top + inset, loc.right - inset, loc.bottom - inset) {
                draw_hollow_rect_mut(frame, rect, color);
            }
        }

        if let Some(strip) = rect_between(loc.left, loc.bottom - LABEL_HEIGHT, loc.right, loc.bottom) {
            draw_filled_rect_mut(frame, strip, color);
        }

        if let Some(font) = font {
            let text_top = loc.bottom - LABEL_PADDING - LABEL_TEXT_SCALE as i32;
            draw_text_mut(
                frame,
                TEXT_COLOR,
                loc.left + LABEL_PADDING,
                text_top,
                PxScale::from(LABEL_TEXT_SCALE),
                font,
                detection.label(),
            );
        }
    }
}

/// Rectangle from corner edges, `None` when degenerate.
fn rect_between(left: i32, top: i32, right: i32, bottom: i32) -> Option<Rect> {
    let width = right - left;
    let height = bottom - top;
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(Rect::at(left, top).of_size(width as u32, height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceLocation;

    fn detection(name: Option<&str>, top: i32, right: i32, bottom: i32, left: i32) -> Detection {
        Detection {
            location: FaceLocation { top, right, bottom, left },
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_known_face_drawn_green_at_scaled_position() {
        let mut frame = RgbImage::new(640, 480);
        // Detection space (160x120) box scaled by 4.
        annotate(&mut frame, &[detection(Some("Ada"), 10, 60, 50, 20)], 4, None);

        // Top-left corner of the border at (80, 40).
        assert_eq!(*frame.get_pixel(80, 40), KNOWN_COLOR);
        assert_eq!(*frame.get_pixel(81, 41), KNOWN_COLOR);
        // Inside the box above the label strip stays untouched.
        assert_eq!(*frame.get_pixel(150, 100), Rgb([0, 0, 0]));
        // Label strip fills the bottom 35 rows inside the box.
        assert_eq!(*frame.get_pixel(150, 199 - 10), KNOWN_COLOR);
        // Nothing outside the scaled box.
        assert_eq!(*frame.get_pixel(79, 40), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(240, 200), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_unknown_face_drawn_red() {
        let mut frame = RgbImage::new(640, 480);
        annotate(&mut frame, &[detection(None, 10, 60, 50, 20)], 4, None);
        assert_eq!(*frame.get_pixel(80, 40), UNKNOWN_COLOR);
    }

    #[test]
    fn test_boxes_past_frame_edge_are_clipped() {
        let mut frame = RgbImage::new(64, 48);
        annotate(&mut frame, &[detection(Some("Ada"), -5, 30, 20, -5)], 4, None);
        // The label strip starts at y = 80 - 35 and is clipped to the frame.
        assert_eq!(*frame.get_pixel(0, 47), KNOWN_COLOR);
        assert_eq!(*frame.get_pixel(63, 47), KNOWN_COLOR);
        assert_eq!(*frame.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        let mut frame = RgbImage::new(64, 48);
        annotate(&mut frame, &[detection(Some("Ada"), 5, 5, 5, 5)], 4, None);
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_rect_between() {
        assert!(rect_between(0, 0, 0, 10).is_none());
        let r = rect_between(2, 3, 12, 8).unwrap();
        assert_eq!((r.left(), r.top(), r.width(), r.height()), (2, 3, 10, 5));
    }

    #[test]
    fn test_missing_font_file() {
        let result = load_font(Path::new("/nonexistent/font.ttf"));
        assert!(matches!(result, Err(FontError::Read { .. })));
    }
}
