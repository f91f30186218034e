use std::path::PathBuf;

/// Stream properties reported by a [`FrameSource`](crate::video::domain::frame_source::FrameSource)
/// when it is opened.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container-reported frame count; 0 when unknown.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Duration in seconds, or `None` when the frame rate or count is unknown.
    pub fn duration_secs(&self) -> Option<f64> {
        if self.fps > 0.0 && self.total_frames > 0 {
            Some(self.total_frames as f64 / self.fps)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(fps: f64, total_frames: usize) -> VideoMetadata {
        VideoMetadata {
            width: 1920,
            height: 1080,
            fps,
            total_frames,
            codec: "h264".to_string(),
            source_path: Some(PathBuf::from("/tmp/upload.mp4")),
        }
    }

    #[test]
    fn test_duration_from_rate_and_count() {
        assert_eq!(metadata(30.0, 900).duration_secs(), Some(30.0));
    }

    #[test]
    fn test_duration_unknown_without_rate() {
        assert_eq!(metadata(0.0, 900).duration_secs(), None);
    }

    #[test]
    fn test_duration_unknown_without_count() {
        assert_eq!(metadata(25.0, 0).duration_secs(), None);
    }
}
