use serde::{Deserialize, Serialize};

/// Tunables for one portrait-selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Gaussian sigma in series positions; `<= 0` disables smoothing.
    pub smoothing_sigma: f64,
    /// Share of ranked peaks kept, rounded down.
    pub peak_keep_ratio: f64,
    /// Share of eye-ranked candidates kept, rounded down.
    pub eye_keep_ratio: f64,
    /// Minimum smiling / valid face ratio for a frame to qualify.
    pub smile_ratio_threshold: f64,
    /// Frames are downscaled to this width before geometry extraction.
    /// `None` analyses frames at native size.
    pub analysis_width: Option<u32>,
}

pub const DEFAULT_SMOOTHING_SIGMA: f64 = 2.0;
pub const DEFAULT_KEEP_RATIO: f64 = 0.7;
pub const DEFAULT_SMILE_RATIO: f64 = 0.7;
pub const DEFAULT_ANALYSIS_WIDTH: u32 = 1000;

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            smoothing_sigma: DEFAULT_SMOOTHING_SIGMA,
            peak_keep_ratio: DEFAULT_KEEP_RATIO,
            eye_keep_ratio: DEFAULT_KEEP_RATIO,
            smile_ratio_threshold: DEFAULT_SMILE_RATIO,
            analysis_width: Some(DEFAULT_ANALYSIS_WIDTH),
        }
    }
}

impl SelectionConfig {
    /// Rejects values that would silently disable or break selection.
    pub fn validate(&self) -> Result<(), String> {
        if !self.smoothing_sigma.is_finite() || self.smoothing_sigma < 0.0 {
            return Err(format!(
                "smoothing_sigma must be a finite, non-negative number, got {}",
                self.smoothing_sigma
            ));
        }
        for (name, ratio) in [
            ("peak_keep_ratio", self.peak_keep_ratio),
            ("eye_keep_ratio", self.eye_keep_ratio),
            ("smile_ratio_threshold", self.smile_ratio_threshold),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(format!("{name} must be between 0.0 and 1.0, got {ratio}"));
            }
        }
        if self.analysis_width == Some(0) {
            return Err("analysis_width must be positive".into());
        }
        Ok(())
    }
}
