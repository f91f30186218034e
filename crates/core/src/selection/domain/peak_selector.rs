use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::selection::domain::score_smoother::ScoreSmoother;

/// A frame that survived peak selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub frame_index: usize,
    pub smoothed_score: f64,
}

/// Number of items kept when retaining `ratio` of `len`, rounded down.
pub fn keep_count(len: usize, ratio: f64) -> usize {
    if ratio.is_nan() || ratio <= 0.0 {
        return 0;
    }
    ((len as f64 * ratio).floor() as usize).min(len)
}

/// Positions `i` with a rising step into `i` and a falling step out of it.
///
/// Plateaus and the two endpoints are never peaks.
pub fn find_peaks(series: &[f64]) -> Vec<usize> {
    if series.len() < 3 {
        return Vec::new();
    }
    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    (1..diff.len())
        .filter(|&i| diff[i - 1] > 0.0 && diff[i] < 0.0)
        .collect()
}

/// Smooths the per-frame score series, finds its local maxima and keeps
/// the best-scoring share of them.
#[derive(Clone, Debug)]
pub struct PeakSelector {
    smoother: ScoreSmoother,
    keep_ratio: f64,
}

impl PeakSelector {
    pub fn new(smoothing_sigma: f64, keep_ratio: f64) -> Self {
        Self {
            smoother: ScoreSmoother::new(smoothing_sigma),
            keep_ratio,
        }
    }

    /// `aggregate` maps frame index to mean score. The series is smoothed in
    /// frame order over the frames present; frames without faces do not
    /// occupy a position.
    ///
    /// Candidates come back ordered by descending smoothed score; ties keep
    /// frame order.
    pub fn select(&self, aggregate: &BTreeMap<usize, f64>) -> Vec<Candidate> {
        let (frames, scores): (Vec<usize>, Vec<f64>) =
            aggregate.iter().map(|(&f, &s)| (f, s)).unzip();
        let smoothed = self.smoother.smooth(&scores);

        let mut candidates: Vec<Candidate> = find_peaks(&smoothed)
            .into_iter()
            .map(|i| Candidate {
                frame_index: frames[i],
                smoothed_score: smoothed[i],
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.smoothed_score
                .partial_cmp(&a.smoothed_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(keep_count(candidates.len(), self.keep_ratio));
        candidates
    }
}
