use std::collections::BTreeMap;

/// Per-face score history: `frames` strictly increasing, `scores` parallel
/// to `frames`.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceTrack {
    face_id: u32,
    frames: Vec<usize>,
    scores: Vec<f64>,
}

impl FaceTrack {
    pub fn new(face_id: u32) -> Self {
        Self {
            face_id,
            frames: Vec::new(),
            scores: Vec::new(),
        }
    }

    /// Appends a score. Rejects frames at or before the last recorded one.
    pub fn push(&mut self, frame_index: usize, score: f64) -> bool {
        if self.frames.last().is_some_and(|&last| frame_index <= last) {
            return false;
        }
        self.frames.push(frame_index);
        self.scores.push(score);
        true
    }

    pub fn face_id(&self) -> u32 {
        self.face_id
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }
}

/// Collects pose scores into face tracks and averages them per frame.
///
/// Faces are not re-identified across frames: every detection opens a
/// new single-observation track.
#[derive(Debug, Default)]
pub struct FaceTrackAggregator {
    tracks: Vec<FaceTrack>,
}

impl FaceTrackAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one detected face's score at `frame_index`.
    pub fn record(&mut self, frame_index: usize, score: f64) {
        let mut track = FaceTrack::new(self.tracks.len() as u32);
        track.push(frame_index, score);
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[FaceTrack] {
        &self.tracks
    }

    /// Every score contributed at each frame, keyed by frame index.
    pub fn contributions(&self) -> BTreeMap<usize, Vec<f64>> {
        let mut by_frame: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for track in &self.tracks {
            for (&frame, &score) in track.frames.iter().zip(&track.scores) {
                by_frame.entry(frame).or_default().push(score);
            }
        }
        by_frame
    }

    /// Mean score per frame. Frames without faces are absent.
    pub fn aggregate(&self) -> BTreeMap<usize, f64> {
        self.contributions()
            .into_iter()
            .map(|(frame, scores)| {
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                (frame, mean)
            })
            .collect()
    }
}
