use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::domain::frame_sink::FrameSink;
use crate::detection::domain::face_geometry::FaceGeometryExtractor;
use crate::scoring::domain::eye_aspect::mean_eye_aspect_ratio;
use crate::scoring::domain::head_pose::HeadPoseScorer;
use crate::scoring::domain::smile::SmileClassifier;
use crate::selection::domain::eye_openness_filter::{EyeMeasurement, EyeOpennessFilter};
use crate::selection::domain::face_track::FaceTrackAggregator;
use crate::selection::domain::peak_selector::{Candidate, PeakSelector};
use crate::shared::cancellation::CancellationToken;
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{FrameSource, OpenedSource, SourceError};

use super::pipeline_logger::PipelineLogger;
use super::selection_config::SelectionConfig;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("pipeline setup failed: {0}")]
    Setup(String),
    #[error("cancelled")]
    Cancelled,
}

/// A frame that passed every filter and was persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualifiedFrame {
    pub frame_index: usize,
    pub smoothed_score: f64,
    pub eye_aspect_ratio: f64,
    pub valid_face_count: usize,
    pub smiling_face_count: usize,
    pub location: String,
}

/// What a run found, stage by stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub frames_scanned: usize,
    pub frames_with_faces: usize,
    /// Ranked peaks kept after truncation.
    pub candidates: Vec<Candidate>,
    /// Candidates kept by the eye-openness filter, in EAR order.
    pub eye_filtered: Vec<usize>,
    /// Qualifying frames in EAR order.
    pub frames: Vec<QualifiedFrame>,
}

/// Linear per-job pipeline: scan and score every frame, pick peaks, filter
/// by eye-aspect ratio, verify smiles, persist what qualifies.
///
/// Only source failures escalate. Per-frame extraction, seek, classifier
/// and storage faults are logged and the affected frame is skipped.
pub struct SelectPortraitsUseCase {
    source: Box<dyn FrameSource>,
    extractor: Box<dyn FaceGeometryExtractor>,
    classifier: Box<dyn SmileClassifier>,
    sink: Arc<dyn FrameSink>,
    scorer: HeadPoseScorer,
    config: SelectionConfig,
}

fn check(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn analysis_frame(frame: &Frame, width: Option<u32>) -> Cow<'_, Frame> {
    match width {
        Some(w) if frame.width() > w => Cow::Owned(frame.resized_to_width(w)),
        _ => Cow::Borrowed(frame),
    }
}

impl SelectPortraitsUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        extractor: Box<dyn FaceGeometryExtractor>,
        classifier: Box<dyn SmileClassifier>,
        sink: Arc<dyn FrameSink>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            classifier,
            sink,
            scorer: HeadPoseScorer::new(),
            config,
        }
    }

    pub fn execute(
        &mut self,
        job_id: &str,
        path: &Path,
        cancel: &CancellationToken,
        logger: &mut dyn PipelineLogger,
    ) -> Result<SelectionOutcome, PipelineError> {
        self.config.validate().map_err(PipelineError::Setup)?;
        check(cancel)?;
        let mut source = OpenedSource::open(self.source.as_mut(), path)?;
        let total = Some(source.metadata().total_frames).filter(|&n| n > 0);
        let width = self.config.analysis_width;

        // 1. Scan: score every face in every frame.
        let mut aggregator = FaceTrackAggregator::new();
        let mut scanned = 0;
        while let Some(frame) = source.next_frame()? {
            check(cancel)?;
            let analysis = analysis_frame(&frame, width);
            let t = Instant::now();
            match self.extractor.extract(&analysis) {
                Ok(faces) => {
                    for face in &faces {
                        let score =
                            self.scorer
                                .score(&face.landmarks, analysis.width(), analysis.height());
                        aggregator.record(frame.index(), score);
                    }
                }
                Err(e) => log::warn!(
                    "[{job_id}] Face extraction failed on frame {}: {e}",
                    frame.index()
                ),
            }
            logger.timing("extract", elapsed_ms(t));
            scanned += 1;
            logger.progress(scanned, total);
        }

        // 2. Smooth the per-frame means and rank the peaks.
        let aggregate = aggregator.aggregate();
        let candidates = PeakSelector::new(self.config.smoothing_sigma, self.config.peak_keep_ratio)
            .select(&aggregate);
        logger.stage_count("frames with faces", aggregate.len());
        logger.stage_count("peak candidates", candidates.len());
        let candidate_frames: BTreeSet<usize> =
            candidates.iter().map(|c| c.frame_index).collect();
        self.extractor.retain_frames(&candidate_frames);
        check(cancel)?;

        // 3. Re-sample candidates in frame order and measure eye openness.
        let mut ears: HashMap<usize, f64> = HashMap::new();
        for candidate in sorted_by_frame(&candidates) {
            check(cancel)?;
            let frame = match source.seek(candidate.frame_index) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("[{job_id}] Skipping candidate: {e}");
                    continue;
                }
            };
            let analysis = analysis_frame(&frame, width);
            let t = Instant::now();
            let faces = match self.extractor.extract(&analysis) {
                Ok(faces) => faces,
                Err(e) => {
                    log::warn!(
                        "[{job_id}] Face extraction failed on candidate {}: {e}",
                        candidate.frame_index
                    );
                    continue;
                }
            };
            logger.timing("eyes", elapsed_ms(t));
            match mean_eye_aspect_ratio(&faces) {
                Some(ear) => {
                    log::debug!("[{job_id}] Frame {} EAR {ear:.3}", candidate.frame_index);
                    ears.insert(candidate.frame_index, ear);
                }
                None => log::debug!(
                    "[{job_id}] Frame {} has no measurable eyes",
                    candidate.frame_index
                ),
            }
        }
        let measured: Vec<EyeMeasurement> = candidates
            .iter()
            .filter_map(|c| {
                ears.get(&c.frame_index).map(|&ear| EyeMeasurement {
                    candidate: *c,
                    eye_aspect_ratio: ear,
                })
            })
            .collect();
        let eye_filtered = EyeOpennessFilter::new(self.config.eye_keep_ratio).filter(measured);
        logger.stage_count("eye-filtered candidates", eye_filtered.len());
        check(cancel)?;

        // 4. Verify smiles on full-resolution frames and persist qualifiers.
        let mut qualified: HashMap<usize, QualifiedFrame> = HashMap::new();
        let kept: Vec<Candidate> = eye_filtered.iter().map(|m| m.candidate).collect();
        for candidate in sorted_by_frame(&kept) {
            check(cancel)?;
            let frame = match source.seek(candidate.frame_index) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("[{job_id}] Skipping candidate: {e}");
                    continue;
                }
            };
            let t = Instant::now();
            let count = match self.classifier.classify(&frame) {
                Ok(count) => count,
                Err(e) => {
                    log::warn!(
                        "[{job_id}] Smile classification failed on frame {}: {e}",
                        candidate.frame_index
                    );
                    continue;
                }
            };
            logger.timing("smile", elapsed_ms(t));
            log::debug!(
                "[{job_id}] Frame {}: {}/{} faces smiling",
                candidate.frame_index,
                count.smiling_face_count,
                count.valid_face_count
            );
            if !count.qualifies(self.config.smile_ratio_threshold) {
                continue;
            }

            let t = Instant::now();
            match self.sink.store(job_id, &frame) {
                Ok(stored) => {
                    let ear = ears.get(&candidate.frame_index).copied().unwrap_or_default();
                    qualified.insert(
                        candidate.frame_index,
                        QualifiedFrame {
                            frame_index: candidate.frame_index,
                            smoothed_score: candidate.smoothed_score,
                            eye_aspect_ratio: ear,
                            valid_face_count: count.valid_face_count,
                            smiling_face_count: count.smiling_face_count,
                            location: stored.location,
                        },
                    );
                }
                Err(e) => log::warn!(
                    "[{job_id}] Failed to store frame {}: {e}",
                    candidate.frame_index
                ),
            }
            logger.timing("store", elapsed_ms(t));
        }

        let frames: Vec<QualifiedFrame> = eye_filtered
            .iter()
            .filter_map(|m| qualified.remove(&m.candidate.frame_index))
            .collect();
        logger.stage_count("stored frames", frames.len());
        logger.summary();

        Ok(SelectionOutcome {
            frames_scanned: scanned,
            frames_with_faces: aggregate.len(),
            candidates,
            eye_filtered: eye_filtered
                .iter()
                .map(|m| m.candidate.frame_index)
                .collect(),
            frames,
        })
    }
}

/// Seek order: ascending frame index, so a decoder can serve every
/// candidate in one forward pass.
fn sorted_by_frame(candidates: &[Candidate]) -> Vec<Candidate> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|c| c.frame_index);
    sorted
}
