use std::collections::{BTreeSet, HashMap};

use crate::detection::domain::face_geometry::{
    DetectedFace, ExtractionError, FaceGeometryExtractor,
};
use crate::shared::frame::Frame;

/// Remembers extraction results by frame index and size.
///
/// The eye-openness pass re-decodes candidate frames the scoring pass has
/// already seen; replaying the cached geometry skips a second inference.
/// Failed extractions are not cached, and [`retain_frames`] prunes the
/// cache down to the frames that will be looked up again.
///
/// [`retain_frames`]: FaceGeometryExtractor::retain_frames
pub struct MemoizingExtractor<E> {
    inner: E,
    cache: HashMap<(usize, u32, u32), Vec<DetectedFace>>,
}

impl<E: FaceGeometryExtractor> MemoizingExtractor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }
}

impl<E: FaceGeometryExtractor> FaceGeometryExtractor for MemoizingExtractor<E> {
    fn extract(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractionError> {
        let key = (frame.index(), frame.width(), frame.height());
        if let Some(faces) = self.cache.get(&key) {
            return Ok(faces.clone());
        }
        let faces = self.inner.extract(frame)?;
        self.cache.insert(key, faces.clone());
        Ok(faces)
    }

    fn retain_frames(&mut self, frame_indices: &BTreeSet<usize>) {
        self.cache
            .retain(|(index, _, _), _| frame_indices.contains(index));
        self.inner.retain_frames(frame_indices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_landmarks::{FaceLandmarks, NUM_LANDMARKS};
    use crate::shared::region::BoundingBox;

    struct CountingExtractor {
        calls: usize,
        fail: bool,
    }

    impl FaceGeometryExtractor for CountingExtractor {
        fn extract(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractionError> {
            self.calls += 1;
            if self.fail {
                return Err(ExtractionError::Inference("session lost".into()));
            }
            Ok(vec![DetectedFace {
                bounds: BoundingBox::new(frame.index() as i32, 0, 10, 10),
                landmarks: FaceLandmarks::new([(0.0, 0.0); NUM_LANDMARKS]),
            }])
        }
    }

    fn frame(index: usize, width: u32) -> Frame {
        Frame::new(vec![0u8; width as usize * 10 * 3], width, 10, index)
    }

    #[test]
    fn test_replays_cached_faces_for_same_frame() {
        let mut extractor = MemoizingExtractor::new(CountingExtractor {
            calls: 0,
            fail: false,
        });
        let first = extractor.extract(&frame(3, 20)).unwrap();
        let second = extractor.extract(&frame(3, 20)).unwrap();
        assert_eq!(first, second);
        assert_eq!(extractor.inner.calls, 1);
    }

    #[test]
    fn test_different_index_or_size_misses() {
        let mut extractor = MemoizingExtractor::new(CountingExtractor {
            calls: 0,
            fail: false,
        });
        extractor.extract(&frame(3, 20)).unwrap();
        extractor.extract(&frame(4, 20)).unwrap();
        extractor.extract(&frame(3, 40)).unwrap();
        assert_eq!(extractor.inner.calls, 3);
    }

    #[test]
    fn test_retain_keeps_only_candidate_frames() {
        let mut extractor = MemoizingExtractor::new(CountingExtractor {
            calls: 0,
            fail: false,
        });
        for index in 0..500 {
            extractor.extract(&frame(index, 20)).unwrap();
        }
        assert_eq!(extractor.cache.len(), 500);

        extractor.retain_frames(&BTreeSet::from([12, 340]));
        assert_eq!(extractor.cache.len(), 2);

        extractor.extract(&frame(12, 20)).unwrap();
        extractor.extract(&frame(340, 20)).unwrap();
        assert_eq!(extractor.inner.calls, 500);
        extractor.extract(&frame(13, 20)).unwrap();
        assert_eq!(extractor.inner.calls, 501);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let mut extractor = MemoizingExtractor::new(CountingExtractor {
            calls: 0,
            fail: true,
        });
        assert!(extractor.extract(&frame(0, 20)).is_err());
        assert!(extractor.extract(&frame(0, 20)).is_err());
        assert_eq!(extractor.inner.calls, 2);
    }
}
