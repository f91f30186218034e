use std::path::Path;

use crate::pipeline::select_portraits_use_case::{PipelineError, SelectPortraitsUseCase};

/// Builds a fresh, fully-wired pipeline for one job.
///
/// This is a port (application-layer interface). The job manager calls it
/// on a worker thread, so construction may load models or open devices.
/// `source_path` lets implementations choose a frame source by input kind.
pub trait PipelineFactory: Send + Sync {
    fn create(&self, source_path: &Path) -> Result<SelectPortraitsUseCase, PipelineError>;
}
