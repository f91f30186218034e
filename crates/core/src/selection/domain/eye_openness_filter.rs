use crate::selection::domain::peak_selector::{keep_count, Candidate};

/// A candidate together with its measured mean eye-aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeMeasurement {
    pub candidate: Candidate,
    pub eye_aspect_ratio: f64,
}

/// Ranks candidates by ascending eye-aspect ratio and keeps the lowest
/// share.
///
/// Lower ratios mean narrower lid openings, so this retains the more
/// closed-eyed frames.
#[derive(Clone, Debug)]
pub struct EyeOpennessFilter {
    keep_ratio: f64,
}

impl EyeOpennessFilter {
    pub fn new(keep_ratio: f64) -> Self {
        Self { keep_ratio }
    }

    pub fn filter(&self, mut measured: Vec<EyeMeasurement>) -> Vec<EyeMeasurement> {
        measured.sort_by(|a, b| {
            a.eye_aspect_ratio
                .partial_cmp(&b.eye_aspect_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        measured.truncate(keep_count(measured.len(), self.keep_ratio));
        measured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(frame_index: usize, ear: f64) -> EyeMeasurement {
        EyeMeasurement {
            candidate: Candidate {
                frame_index,
                smoothed_score: 90.0,
            },
            eye_aspect_ratio: ear,
        }
    }

    fn frames(kept: &[EyeMeasurement]) -> Vec<usize> {
        kept.iter().map(|m| m.candidate.frame_index).collect()
    }

    #[test]
    fn test_sorts_ascending_and_keeps_seventy_percent() {
        let measured = (0..10)
            .map(|i| measurement(i, 0.40 - i as f64 * 0.02))
            .collect();
        let kept = EyeOpennessFilter::new(0.7).filter(measured);
        assert_eq!(frames(&kept), vec![9, 8, 7, 6, 5, 4, 3]);
    }

    /// Flags the selection direction: with one wide-open and two nearly
    /// closed frames, the closed ones survive and the open one is dropped.
    #[test]
    fn test_retains_lower_ratio_which_favours_closed_eyes() {
        let measured = vec![
            measurement(10, 0.32),
            measurement(20, 0.05),
            measurement(30, 0.08),
        ];
        let kept = EyeOpennessFilter::new(0.7).filter(measured);
        assert_eq!(frames(&kept), vec![20, 30]);
        assert!(kept.iter().all(|m| m.eye_aspect_ratio < 0.1));
    }

    #[test]
    fn test_ties_keep_incoming_order() {
        let measured = vec![measurement(7, 0.2), measurement(3, 0.2), measurement(5, 0.3)];
        let kept = EyeOpennessFilter::new(0.7).filter(measured);
        assert_eq!(frames(&kept), vec![7, 3]);
    }

    #[test]
    fn test_empty_input() {
        assert!(EyeOpennessFilter::new(0.7).filter(Vec::new()).is_empty());
    }
}
