//! Alternating-frame detection with an explicit carried-over cache.

use crate::types::Detection;

/// Whether a detection set was computed on this frame or carried from an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Carried,
}

/// Decides which frames run detection and remembers the last result for the rest.
///
/// Runs detection on one frame in every `interval`, starting with the first.
#[derive(Debug)]
pub struct DetectionCache {
    interval: usize,
    position: usize,
    detections: Vec<Detection>,
    freshness: Freshness,
}

impl DetectionCache {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            position: 0,
            detections: Vec::new(),
            freshness: Freshness::Carried,
        }
    }

    /// Whether the next frame should run detection.
    pub fn due(&self) -> bool {
        self.position == 0
    }

    /// Store the detections computed for the current frame.
    pub fn refresh(&mut self, detections: Vec<Detection>) {
        self.detections = detections;
        self.freshness = Freshness::Fresh;
    }

    /// Reuse the previous detections for the current frame.
    pub fn carry(&mut self) {
        self.freshness = Freshness::Carried;
    }

    /// Move the cycle forward one frame. Called once per frame that was read.
    pub fn advance(&mut self) {
        self.position = (self.position + 1) % self.interval;
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceLocation;

    fn det(name: &str) -> Detection {
        Detection {
            location: FaceLocation { top: 1, right: 2, bottom: 3, left: 0 },
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_alternates_every_other_frame() {
        let mut cache = DetectionCache::new(2);
        let mut pattern = Vec::new();
        for _ in 0..6 {
            pattern.push(cache.due());
            cache.advance();
        }
        assert_eq!(pattern, [true, false, true, false, true, false]);
    }

    #[test]
    fn test_carry_keeps_previous_detections() {
        let mut cache = DetectionCache::new(2);
        cache.refresh(vec![det("Ada")]);
        assert_eq!(cache.freshness(), Freshness::Fresh);
        cache.advance();

        assert!(!cache.due());
        cache.carry();
        assert_eq!(cache.freshness(), Freshness::Carried);
        assert_eq!(cache.detections(), &[det("Ada")]);
    }

    #[test]
    fn test_refresh_replaces_with_empty() {
        let mut cache = DetectionCache::new(2);
        cache.refresh(vec![det("Ada")]);
        cache.refresh(Vec::new());
        assert!(cache.detections().is_empty());
    }

    #[test]
    fn test_zero_interval_means_every_frame() {
        let mut cache = DetectionCache::new(0);
        assert!(cache.due());
        cache.advance();
        assert!(cache.due());
    }
}
