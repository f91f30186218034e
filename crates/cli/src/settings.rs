use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use portrait_core::jobs::job_manager::JobManagerConfig;
use portrait_core::pipeline::selection_config::SelectionConfig;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub selection: SelectionConfig,
    pub jobs: JobManagerConfig,
    /// Extra directory searched for ONNX models after the user cache.
    pub models_dir: Option<PathBuf>,
    /// Local sink root, used when no upload URL is set.
    pub output_dir: PathBuf,
    pub upload_url: Option<String>,
    pub detection_confidence: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            jobs: JobManagerConfig::default(),
            models_dir: None,
            output_dir: PathBuf::from("portraits"),
            upload_url: None,
            detection_confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Portrait Picker").join("settings.json"))
    }

    /// Settings from `path` when given (errors are reported), otherwise from
    /// the per-user config file if it exists and parses, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::config_path()
                .and_then(|path| fs::read_to_string(path).ok())
                .and_then(|json| serde_json::from_str(&json).ok())
                .unwrap_or_default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config {}: {e}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid config {}: {e}", path.display()))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                self.detection_confidence
            ));
        }
        self.selection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"upload_url": "http://localhost:9000/upload", "selection": {"smoothing_sigma": 3.0}}"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(
            settings.upload_url.as_deref(),
            Some("http://localhost:9000/upload")
        );
        assert_eq!(settings.selection.smoothing_sigma, 3.0);
        assert_eq!(settings.selection.peak_keep_ratio, 0.7);
        assert_eq!(settings.jobs.max_concurrent_jobs, 2);
        assert_eq!(settings.detection_confidence, 0.5);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.detection_confidence = 1.5;
        assert!(settings.validate().is_err());

        settings = Settings::default();
        settings.selection.eye_keep_ratio = -0.1;
        assert!(settings.validate().unwrap_err().contains("eye_keep_ratio"));
    }

    #[rstest]
    #[case(-1.0)]
    #[case(-0.001)]
    fn test_validate_rejects_negative_sigma_from_file(#[case] sigma: f64) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, format!(r#"{{"selection": {{"smoothing_sigma": {sigma}}}}}"#)).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert!(settings.validate().unwrap_err().contains("smoothing_sigma"));
    }

    #[test]
    fn test_validate_rejects_nan_sigma() {
        let mut settings = Settings::default();
        settings.selection.smoothing_sigma = f64::NAN;
        assert!(settings.validate().unwrap_err().contains("smoothing_sigma"));
    }
}
