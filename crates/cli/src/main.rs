mod settings;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use portrait_core::delivery::domain::frame_sink::FrameSink;
use portrait_core::delivery::infrastructure::http_upload_sink::HttpUploadSink;
use portrait_core::delivery::infrastructure::image_file_sink::ImageFileSink;
use portrait_core::jobs::job::JobStatus;
use portrait_core::jobs::job_manager::JobManager;
use portrait_core::pipeline::infrastructure::onnx_pipeline_factory::{
    ModelPaths, OnnxPipelineFactory,
};
use portrait_core::shared::constants::IMAGE_EXTENSIONS;

use settings::Settings;

/// Pick smiling, frontal portrait frames from videos.
#[derive(Parser)]
#[command(name = "portrait-picker")]
struct Cli {
    /// Input videos, or directories of still frames.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON settings file (defaults to the per-user config).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory searched for ONNX models, e.g. the landmark model.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Write selected frames here (ignored with --upload-url).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// POST selected frames to this endpoint instead of writing them locally.
    #[arg(long)]
    upload_url: Option<String>,

    /// Number of videos processed concurrently.
    #[arg(long)]
    workers: Option<usize>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Seconds to wait for each job before giving up on it.
    #[arg(long, default_value = "3600")]
    timeout: u64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    validate_inputs(&cli.inputs)?;

    let factory = OnnxPipelineFactory::new(
        resolve_models(settings.models_dir.as_deref())?,
        settings.detection_confidence,
        settings.jobs.max_concurrent_jobs,
        build_sink(&settings)?,
        settings.selection.clone(),
    );
    let manager = JobManager::new(settings.jobs.clone(), Arc::new(factory));

    let mut job_ids = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let job_id = stage_input(&manager, input, &settings.jobs.staging_dir)?;
        log::info!("{} -> job {job_id}", input.display());
        job_ids.push(job_id);
    }

    let timeout = Duration::from_secs(cli.timeout);
    let mut failures = 0;
    for job_id in &job_ids {
        let Some(job) = manager.wait(job_id, timeout) else {
            continue;
        };
        if job.status != JobStatus::Completed {
            failures += 1;
        }
        println!("{}", serde_json::to_string_pretty(&job)?);
    }

    if failures > 0 {
        return Err(format!("{failures} of {} job(s) did not complete", job_ids.len()).into());
    }
    Ok(())
}

fn resolve_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.models_dir {
        settings.models_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(url) = &cli.upload_url {
        settings.upload_url = Some(url.clone());
    }
    if let Some(workers) = cli.workers {
        settings.jobs.max_concurrent_jobs = workers;
    }
    if let Some(confidence) = cli.confidence {
        settings.detection_confidence = confidence;
    }
    settings.validate()?;
    Ok(settings)
}

fn validate_inputs(inputs: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    for input in inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    Ok(())
}

fn resolve_models(models_dir: Option<&Path>) -> Result<ModelPaths, Box<dyn std::error::Error>> {
    log::info!("Resolving models");
    let models = ModelPaths::resolve(models_dir)?;
    log::debug!("Using models {models:?}");
    Ok(models)
}

fn build_sink(settings: &Settings) -> Result<Arc<dyn FrameSink>, Box<dyn std::error::Error>> {
    match &settings.upload_url {
        Some(url) => {
            let url = reqwest::Url::parse(url).map_err(|e| format!("Invalid upload URL {url}: {e}"))?;
            log::info!("Uploading selected frames to {url}");
            let client = Arc::new(reqwest::blocking::Client::new());
            Ok(Arc::new(HttpUploadSink::new(client, url)))
        }
        None => {
            log::info!("Writing selected frames to {}", settings.output_dir.display());
            Ok(Arc::new(ImageFileSink::new(&settings.output_dir)))
        }
    }
}

/// Jobs delete their source when they finish, so inputs are copied into the
/// staging area first.
fn stage_input(
    manager: &JobManager,
    input: &Path,
    staging_dir: &Path,
) -> Result<String, Box<dyn std::error::Error>> {
    if !input.is_dir() {
        let mut file = File::open(input)?;
        return Ok(manager.accept_upload(&mut file, None)?);
    }

    fs::create_dir_all(staging_dir)?;
    let frames = tempfile::Builder::new()
        .prefix("frames-")
        .tempdir_in(staging_dir)?
        .keep();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        if is_image(&path) {
            if let Some(name) = path.file_name() {
                fs::copy(&path, frames.join(name))?;
            }
        }
    }
    manager.submit(&frames, None).map_err(|e| {
        let _ = fs::remove_dir_all(&frames);
        e.into()
    })
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
