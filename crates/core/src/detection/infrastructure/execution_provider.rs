use std::path::Path;

/// Return the preferred ONNX execution providers for the current platform.
///
/// Falls back to CPU if the platform-specific provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Loads an ONNX model with the platform's preferred providers.
///
/// Each job owns its sessions, so intra-op threads are split across the
/// configured number of concurrent jobs.
pub fn build_session(
    model_path: &Path,
    concurrent_jobs: usize,
) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let intra_threads = (cores / concurrent_jobs.max(1)).max(1);
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Reads the spatial input size `(height, width)` from an NCHW model input.
pub fn input_hw(session: &ort::session::Session) -> Option<(u32, u32)> {
    session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            if shape.len() >= 4 && shape[2] > 0 && shape[3] > 0 {
                Some((shape[2] as u32, shape[3] as u32))
            } else {
                None
            }
        } else {
            None
        }
    })
}
