//! Per-frame recognition: shrink, detect, match, log, draw.
//!
//! [`FrameProcessor`] owns everything one capture run needs except the camera,
//! so the capture loop only has to read frames, hand them over and emit the
//! result.

use crate::analyzer::{AnalyzerError, SharedAnalyzer};
use crate::duty_cycle::{DetectionCache, Freshness};
use crate::overlay;
use crate::recognition_log::RecognitionLog;
use crate::types::{Detection, Identity, Matcher, FirstMatch};
use ab_glyph::FontArc;
use chrono::{Local, NaiveDateTime};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;

/// Detection runs on frames shrunk by this factor on both axes.
pub const DETECTION_SCALE: f32 = 0.25;
/// Inverse of [`DETECTION_SCALE`], applied to detected locations.
pub const UPSCALE: i32 = 4;
/// Detection runs on one frame out of this many.
pub const PROCESS_INTERVAL: usize = 2;

/// A frame ready for display, with the detections drawn on it.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    /// Detections in detection-space coordinates.
    pub detections: Vec<Detection>,
    pub freshness: Freshness,
    pub sequence: u64,
}

/// Recognition state for one capture run.
pub struct FrameProcessor {
    analyzer: SharedAnalyzer,
    gallery: Arc<[Identity]>,
    threshold: f32,
    log: Option<RecognitionLog>,
    font: Option<FontArc>,
    cache: DetectionCache,
    clock: fn() -> NaiveDateTime,
    sequence: u64,
}

impl FrameProcessor {
    pub fn new(analyzer: SharedAnalyzer, gallery: Arc<[Identity]>, threshold: f32) -> Self {
        Self {
            analyzer,
            gallery,
            threshold,
            log: None,
            font: None,
            cache: DetectionCache::new(PROCESS_INTERVAL),
            clock: local_now,
            sequence: 0,
        }
    }

    /// Append a row per recognized face on every processed frame.
    pub fn with_log(mut self, log: RecognitionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Draw names with `font`; without one only boxes and strips are drawn.
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    /// Timestamp source for log rows.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Run one full-resolution frame through the duty cycle and annotate it.
    pub fn process(&mut self, mut frame: RgbImage) -> AnnotatedFrame {
        if self.cache.due() {
            match self.detect(&frame) {
                Ok(detections) => self.cache.refresh(detections),
                Err(e) => {
                    tracing::warn!(error = %e, "detection failed; keeping previous boxes");
                    self.cache.carry();
                }
            }
        } else {
            self.cache.carry();
        }
        self.cache.advance();

        let freshness = self.cache.freshness();
        if freshness == Freshness::Fresh {
            self.log_recognitions();
        }

        let detections = self.cache.detections().to_vec();
        overlay::annotate(&mut frame, &detections, UPSCALE, self.font.as_ref());

        let sequence = self.sequence;
        self.sequence += 1;
        AnnotatedFrame {
            image: frame,
            detections,
            freshness,
            sequence,
        }
    }

    /// Locate, encode and match faces on a shrunk copy of `frame`.
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, AnalyzerError> {
        let small = shrink(frame);

        let mut analyzer = self.analyzer.lock().map_err(|_| AnalyzerError::Poisoned)?;
        let faces = analyzer.locate(&small)?;
        if faces.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = analyzer.encode(&small, &faces)?;
        drop(analyzer);

        if embeddings.len() != faces.len() {
            tracing::warn!(
                faces = faces.len(),
                embeddings = embeddings.len(),
                "encoder returned the wrong number of embeddings; unmatched faces shown as unknown"
            );
        }

        // A face without an embedding stays on screen as unknown.
        let detections: Vec<Detection> = faces
            .iter()
            .enumerate()
            .map(|(i, face)| Detection {
                location: face.location(),
                name: embeddings
                    .get(i)
                    .and_then(|embedding| FirstMatch.find(embedding, &self.gallery, self.threshold))
                    .map(|idx| self.gallery[idx].name.clone()),
            })
            .collect();

        tracing::debug!(
            faces = detections.len(),
            known = detections.iter().filter(|d| d.is_known()).count(),
            "processed frame"
        );
        Ok(detections)
    }

    fn log_recognitions(&self) {
        let Some(log) = &self.log else {
            return;
        };
        let now = (self.clock)();
        for name in self.cache.detections().iter().filter_map(|d| d.name.as_deref()) {
            if let Err(e) = log.record_at(name, now) {
                tracing::warn!(error = %e, name, "failed to write recognition log");
            }
        }
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Shrink a frame by [`DETECTION_SCALE`], keeping at least one pixel per axis.
pub fn shrink(frame: &RgbImage) -> RgbImage {
    let w = ((frame.width() as f32 * DETECTION_SCALE).round() as u32).max(1);
    let h = ((frame.height() as f32 * DETECTION_SCALE).round() as u32).max(1);
    imageops::resize(frame, w, h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{bbox, ScriptedAnalyzer};
    use crate::analyzer::FaceAnalyzer;
    use crate::types::{Embedding, FaceLocation};
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Mutex;

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(10, 30, 0).unwrap())
    }

    fn ada() -> Embedding {
        Embedding::new(vec![1.0, 0.0, 0.0])
    }

    fn stranger() -> Embedding {
        Embedding::new(vec![0.0, 0.0, 1.0])
    }

    fn gallery() -> Arc<[Identity]> {
        vec![Identity::new("Ada", ada())].into()
    }

    fn frame() -> RgbImage {
        RgbImage::new(640, 480)
    }

    struct Harness {
        analyzer: Arc<Mutex<ScriptedAnalyzer>>,
        processor: FrameProcessor,
        log: RecognitionLog,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log = RecognitionLog::new(dir.path());
        let analyzer = Arc::new(Mutex::new(ScriptedAnalyzer::default()));
        let shared: SharedAnalyzer = analyzer.clone();
        let processor = FrameProcessor::new(shared, gallery(), 0.4)
            .with_log(log.clone())
            .with_clock(fixed_clock);
        Harness {
            analyzer,
            processor,
            log,
            _dir: dir,
        }
    }

    impl Harness {
        fn script(&self, faces: Vec<(crate::types::BoundingBox, Embedding)>) {
            self.analyzer.lock().unwrap().push(faces);
        }

        fn log_rows(&self) -> Vec<String> {
            self.log
                .read_day(fixed_clock().date())
                .unwrap()
                .map(|s| s.lines().skip(1).map(str::to_string).collect())
                .unwrap_or_default()
        }
    }

    #[test]
    fn test_shrink_quarter_size() {
        assert_eq!(shrink(&frame()).dimensions(), (160, 120));
        assert_eq!(shrink(&RgbImage::new(2, 2)).dimensions(), (1, 1));
    }

    #[test]
    fn test_detection_runs_on_alternate_frames() {
        let mut h = harness();
        for _ in 0..6 {
            h.processor.process(frame());
        }
        assert_eq!(h.analyzer.lock().unwrap().locate_calls, 3);
    }

    #[test]
    fn test_known_and_unknown_faces() {
        let mut h = harness();
        h.script(vec![
            (bbox(10.0, 10.0, 20.0, 30.0), ada()),
            (bbox(80.0, 20.0, 20.0, 20.0), stranger()),
        ]);

        let out = h.processor.process(frame());
        assert_eq!(out.freshness, Freshness::Fresh);
        assert_eq!(out.detections.len(), 2);
        assert_eq!(out.detections[0].name.as_deref(), Some("Ada"));
        assert_eq!(out.detections[1].name, None);
        assert_eq!(
            out.detections[0].location,
            FaceLocation { top: 10, right: 30, bottom: 40, left: 10 }
        );

        // Boxes land at 4x detection coordinates: green for Ada, red for the stranger.
        assert_eq!(*out.image.get_pixel(40, 40), overlay::KNOWN_COLOR);
        assert_eq!(*out.image.get_pixel(320, 80), overlay::UNKNOWN_COLOR);
    }

    #[test]
    fn test_skip_frame_reuses_previous_boxes() {
        let mut h = harness();
        h.script(vec![(bbox(10.0, 10.0, 20.0, 30.0), ada())]);

        let first = h.processor.process(frame());
        let second = h.processor.process(frame());

        assert_eq!(second.freshness, Freshness::Carried);
        assert_eq!(second.detections, first.detections);
        assert_eq!(second.image, first.image);
        assert_eq!((first.sequence, second.sequence), (0, 1));
    }

    #[test]
    fn test_logs_once_per_processed_frame() {
        let mut h = harness();
        for _ in 0..2 {
            h.script(vec![
                (bbox(10.0, 10.0, 20.0, 30.0), ada()),
                (bbox(80.0, 20.0, 20.0, 20.0), stranger()),
            ]);
        }

        // Four frames: two processed, two carried.
        for _ in 0..4 {
            h.processor.process(frame());
        }

        assert_eq!(
            h.log_rows(),
            ["2024-05-01 10:30:00,Ada", "2024-05-01 10:30:00,Ada"]
        );
    }

    #[test]
    fn test_no_face_means_no_boxes_and_no_rows() {
        let mut h = harness();
        h.script(vec![]);
        let out = h.processor.process(frame());
        assert!(out.detections.is_empty());
        assert!(out.image.pixels().all(|p| p.0 == [0, 0, 0]));
        assert!(h.log_rows().is_empty());
    }

    #[test]
    fn test_empty_gallery_marks_everyone_unknown() {
        let analyzer = Arc::new(Mutex::new(ScriptedAnalyzer::default()));
        analyzer.lock().unwrap().push(vec![(bbox(0.0, 0.0, 10.0, 10.0), ada())]);
        let shared: SharedAnalyzer = analyzer.clone();
        let mut processor = FrameProcessor::new(shared, Vec::<Identity>::new().into(), 0.4);

        let out = processor.process(frame());
        assert_eq!(out.detections[0].name, None);
    }

    struct FailingAnalyzer;

    impl FaceAnalyzer for FailingAnalyzer {
        fn locate(&mut self, _frame: &RgbImage) -> Result<Vec<crate::types::BoundingBox>, AnalyzerError> {
            Err(AnalyzerError::Poisoned)
        }

        fn encode(
            &mut self,
            _frame: &RgbImage,
            _faces: &[crate::types::BoundingBox],
        ) -> Result<Vec<Embedding>, AnalyzerError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_detection_failure_still_emits_frame() {
        let shared: SharedAnalyzer = Arc::new(Mutex::new(FailingAnalyzer));
        let mut processor = FrameProcessor::new(shared, gallery(), 0.4);
        let out = processor.process(frame());
        assert_eq!(out.freshness, Freshness::Carried);
        assert!(out.detections.is_empty());
    }

    /// Finds two faces but only encodes the first.
    struct ShortEncoder;

    impl FaceAnalyzer for ShortEncoder {
        fn locate(&mut self, _frame: &RgbImage) -> Result<Vec<crate::types::BoundingBox>, AnalyzerError> {
            Ok(vec![bbox(10.0, 10.0, 20.0, 30.0), bbox(80.0, 20.0, 20.0, 20.0)])
        }

        fn encode(
            &mut self,
            _frame: &RgbImage,
            _faces: &[crate::types::BoundingBox],
        ) -> Result<Vec<Embedding>, AnalyzerError> {
            Ok(vec![ada()])
        }
    }

    #[test]
    fn test_face_without_embedding_kept_as_unknown() {
        let shared: SharedAnalyzer = Arc::new(Mutex::new(ShortEncoder));
        let mut processor = FrameProcessor::new(shared, gallery(), 0.4);

        let out = processor.process(frame());
        assert_eq!(out.detections.len(), 2);
        assert_eq!(out.detections[0].name.as_deref(), Some("Ada"));
        assert_eq!(out.detections[1].name, None);
        assert_eq!(*out.image.get_pixel(320, 80), overlay::UNKNOWN_COLOR);
    }
}
