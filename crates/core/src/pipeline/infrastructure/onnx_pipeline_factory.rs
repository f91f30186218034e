use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::delivery::domain::frame_sink::FrameSink;
use crate::detection::infrastructure::memoizing_extractor::MemoizingExtractor;
use crate::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use crate::detection::infrastructure::onnx_landmark_extractor::OnnxLandmarkExtractor;
use crate::pipeline::pipeline_factory::PipelineFactory;
use crate::pipeline::select_portraits_use_case::{PipelineError, SelectPortraitsUseCase};
use crate::pipeline::selection_config::SelectionConfig;
use crate::scoring::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use crate::shared::constants::{
    EMOTION_MODEL_NAME, EMOTION_MODEL_URL, FACE_DETECTOR_MODEL_NAME, FACE_DETECTOR_MODEL_URL,
    LANDMARK_MODEL_NAME,
};
use crate::shared::model_resolver::{self, ModelResolveError};
use crate::video::domain::frame_source::FrameSource;
use crate::video::infrastructure::ffmpeg_source::FfmpegFrameSource;
use crate::video::infrastructure::image_sequence_source::ImageSequenceSource;

/// Locations of the three models a pipeline needs.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub landmarks: PathBuf,
    pub emotion: PathBuf,
}

impl ModelPaths {
    /// Resolve every model through the cache, `models_dir`, then download.
    pub fn resolve(models_dir: Option<&Path>) -> Result<Self, ModelResolveError> {
        Ok(Self {
            face_detector: model_resolver::resolve(
                FACE_DETECTOR_MODEL_NAME,
                Some(FACE_DETECTOR_MODEL_URL),
                models_dir,
                None,
            )?,
            landmarks: model_resolver::resolve(LANDMARK_MODEL_NAME, None, models_dir, None)?,
            emotion: model_resolver::resolve(
                EMOTION_MODEL_NAME,
                Some(EMOTION_MODEL_URL),
                models_dir,
                None,
            )?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceKind {
    Video,
    ImageSequence,
}

fn source_kind(path: &Path) -> SourceKind {
    if path.is_dir() {
        SourceKind::ImageSequence
    } else {
        SourceKind::Video
    }
}

/// Wires ONNX Runtime models, an ffmpeg or image-directory source and a
/// shared sink into a [`SelectPortraitsUseCase`].
///
/// Sessions are built per job so that concurrent workers never share one.
pub struct OnnxPipelineFactory {
    models: ModelPaths,
    confidence: f64,
    concurrent_jobs: usize,
    sink: Arc<dyn FrameSink>,
    config: SelectionConfig,
}

impl OnnxPipelineFactory {
    pub fn new(
        models: ModelPaths,
        confidence: f64,
        concurrent_jobs: usize,
        sink: Arc<dyn FrameSink>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            models,
            confidence,
            concurrent_jobs: concurrent_jobs.max(1),
            sink,
            config,
        }
    }

    fn detector(&self) -> Result<OnnxFaceDetector, PipelineError> {
        OnnxFaceDetector::new(
            &self.models.face_detector,
            self.confidence,
            self.concurrent_jobs,
        )
        .map_err(|e| setup_error("face detector", &self.models.face_detector, e))
    }
}

fn setup_error(what: &str, path: &Path, e: Box<dyn std::error::Error>) -> PipelineError {
    PipelineError::Setup(format!("failed to load {what} from {}: {e}", path.display()))
}

impl PipelineFactory for OnnxPipelineFactory {
    fn create(&self, source_path: &Path) -> Result<SelectPortraitsUseCase, PipelineError> {
        let extractor =
            OnnxLandmarkExtractor::new(self.detector()?, &self.models.landmarks, self.concurrent_jobs)
                .map_err(|e| setup_error("landmark model", &self.models.landmarks, e))?;
        let classifier =
            OnnxEmotionClassifier::new(self.detector()?, &self.models.emotion, self.concurrent_jobs)
                .map_err(|e| setup_error("emotion model", &self.models.emotion, e))?;

        let source: Box<dyn FrameSource> = match source_kind(source_path) {
            SourceKind::Video => Box::new(FfmpegFrameSource::new()),
            SourceKind::ImageSequence => Box::new(ImageSequenceSource::new()),
        };

        Ok(SelectPortraitsUseCase::new(
            source,
            Box::new(MemoizingExtractor::new(extractor)),
            Box::new(classifier),
            self.sink.clone(),
            self.config.clone(),
        ))
    }
}
