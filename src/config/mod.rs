//! Application Configuration
//!
//! Classifier, capture and storage settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Classifier settings
    pub classifier: ClassifierSettings,
    /// Capture settings
    pub capture: CaptureSettings,
    /// Result history settings
    pub storage: StorageSettings,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enables development-only features such as the mock classifier
    pub development_mode: bool,
}

/// Which classifier backend produces results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// ONNX model run in-process
    #[default]
    OnDevice,
    /// HTTP `/predict` endpoint
    Remote,
    /// Pseudo-random results, development only
    Mock,
}

/// Memory layout of the model input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, height, width, channels]`
    #[default]
    Nhwc,
    /// `[1, channels, height, width]`
    Nchw,
}

/// Classifier-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Backend used by the classifier client
    pub backend: BackendKind,
    /// On-device model artifact. Defaults to `<data dir>/models/adhesion.onnx`
    pub model_path: Option<PathBuf>,
    /// Expected SHA-256 of the model artifact (hex)
    pub model_sha256: Option<String>,
    /// Side length of the square model input
    pub input_size: u32,
    /// Number of input channels (3 = RGB, 1 = luma)
    pub channels: u32,
    /// Input tensor layout
    pub layout: TensorLayout,
    /// Per-channel mean subtracted after scaling to 0-1
    pub mean: [f32; 3],
    /// Per-channel std divided after mean subtraction
    pub std: [f32; 3],
    /// Base URL of the remote classifier
    pub endpoint: String,
    /// Remote request timeout in seconds
    pub timeout_secs: u64,
    /// Longest side of images uploaded to the remote classifier
    pub upload_max_dimension: u32,
    /// JPEG quality of uploaded images (1-100)
    pub upload_jpeg_quality: u8,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::OnDevice,
            model_path: None,
            model_sha256: None,
            input_size: 224,
            channels: 3,
            layout: TensorLayout::Nhwc,
            mean: [0.0, 0.0, 0.0],
            std: [1.0, 1.0, 1.0],
            endpoint: "http://localhost:5000".to_string(),
            timeout_secs: 30,
            upload_max_dimension: 1024,
            upload_jpeg_quality: 85,
        }
    }
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Interval between live-scan ticks in milliseconds
    pub scan_interval_ms: u64,
    /// Longest side of preview frames used for live scanning
    pub preview_max_dimension: u32,
    /// Directory for per-frame scratch files (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: 500,
            preview_max_dimension: 640,
            scratch_dir: None,
        }
    }
}

/// Result history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Settings database. Defaults to `<data dir>/settings.db`
    pub database_path: Option<PathBuf>,
    /// Key under which the result history blob is stored
    pub history_key: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            history_key: crate::storage::DEFAULT_HISTORY_KEY.to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert!(!config.general.development_mode);

        assert_eq!(config.classifier.backend, BackendKind::OnDevice);
        assert_eq!(config.classifier.input_size, 224);
        assert_eq!(config.classifier.channels, 3);
        assert_eq!(config.classifier.layout, TensorLayout::Nhwc);
        assert_eq!(config.classifier.endpoint, "http://localhost:5000");

        assert_eq!(config.capture.scan_interval_ms, 500);
        assert!(config.capture.scratch_dir.is_none());

        assert_eq!(config.storage.history_key, "adhesion_results");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.general.development_mode, parsed.general.development_mode);
        assert_eq!(config.classifier.backend, parsed.classifier.backend);
        assert_eq!(config.capture.scan_interval_ms, parsed.capture.scan_interval_ms);
        assert_eq!(config.storage.history_key, parsed.storage.history_key);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [classifier]
            backend = "remote"
            endpoint = "http://10.0.2.2:5000"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.classifier.backend, BackendKind::Remote);
        assert_eq!(parsed.classifier.endpoint, "http://10.0.2.2:5000");
        assert_eq!(parsed.classifier.input_size, 224);
        assert_eq!(parsed.capture.scan_interval_ms, 500);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.general.development_mode = true;
        config.classifier.backend = BackendKind::Mock;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert!(loaded.general.development_mode);
        assert_eq!(loaded.classifier.backend, BackendKind::Mock);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
