//! Classification Layer
//!
//! Turns image bytes into result records. Supports three backends:
//! - On-device ONNX model
//! - Remote `/predict` HTTP endpoint
//! - Mock results for development
//!
//! [`ClassifierClient`] is the only entry point callers use. It never fails:
//! every error becomes a record with the `Error` prediction.

pub mod error;
pub mod mock;
pub mod models;
pub mod on_device;
pub mod preprocess;
pub mod record;
pub mod remote;

pub use error::ClassifyError;
pub use mock::MockClassifier;
pub use models::{ModelHandle, OnnxSession};
pub use on_device::OnDeviceClassifier;
pub use preprocess::PreprocessConfig;
pub use record::{Classification, Prediction, ResultRecord};
pub use remote::{HealthStatus, RemoteClassifier};

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, BackendKind};

/// Per-call options forwarded to the backend
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyOptions {
    /// The image is a frame from a live scan rather than a still capture
    pub is_video_frame: bool,
}

/// A classification backend
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Classify an already decoded image
    async fn infer(
        &self,
        image: &DynamicImage,
        options: &ClassifyOptions,
    ) -> Result<Classification, ClassifyError>;
}

/// Formats accepted for classification
pub const SUPPORTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp];

/// Decode image bytes, rejecting formats outside [`SUPPORTED_FORMATS`]
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ClassifyError> {
    if bytes.is_empty() {
        return Err(ClassifyError::Decode("empty image data".to_string()));
    }

    let format = image::guess_format(bytes)
        .map_err(|_| ClassifyError::Decode("unrecognized image data".to_string()))?;

    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(ClassifyError::UnsupportedFormat(format!("{:?}", format)));
    }

    Ok(image::load_from_memory_with_format(bytes, format)?)
}

/// Front door for classification
#[derive(Clone)]
pub struct ClassifierClient {
    backend: Arc<dyn Classifier>,
}

impl ClassifierClient {
    /// Wrap an existing backend
    pub fn new(backend: Arc<dyn Classifier>) -> Self {
        Self { backend }
    }

    /// Build the backend selected in `config`.
    ///
    /// The mock backend is refused unless `general.development_mode` is set.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let settings = &config.classifier;

        let backend: Arc<dyn Classifier> = match settings.backend {
            BackendKind::OnDevice => {
                let path = match &settings.model_path {
                    Some(path) => path.clone(),
                    None => models::default_model_path()?,
                };
                let mut model = ModelHandle::new(path);
                if let Some(sha) = &settings.model_sha256 {
                    model = model.with_checksum(sha.clone());
                }
                Arc::new(OnDeviceClassifier::new(
                    Arc::new(model),
                    PreprocessConfig::from(settings),
                ))
            }
            BackendKind::Remote => Arc::new(RemoteClassifier::new(
                settings,
                config.capture.scratch_dir.clone(),
            )?),
            BackendKind::Mock => {
                if !config.general.development_mode {
                    bail!("The mock classifier is only available with general.development_mode = true");
                }
                warn!("Using mock classifier: results are random");
                Arc::new(MockClassifier::new())
            }
        };

        info!("Classifier backend: {}", backend.name());
        Ok(Self { backend })
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Classify a still image
    pub async fn classify(&self, image_bytes: &[u8]) -> ResultRecord {
        self.classify_frame(image_bytes, false).await
    }

    /// Classify an image, flagging whether it is a live video frame
    pub async fn classify_frame(&self, image_bytes: &[u8], is_video_frame: bool) -> ResultRecord {
        let options = ClassifyOptions { is_video_frame };
        let start = Instant::now();

        match self.try_classify(image_bytes, &options).await {
            Ok(classification) => {
                debug!(
                    "Classified with {} in {:?}: {} ({:.2})",
                    self.backend.name(),
                    start.elapsed(),
                    classification.prediction,
                    classification.probability
                );
                ResultRecord::from_classification(classification)
            }
            Err(e) => {
                warn!("Classification failed: {}", e);
                ResultRecord::failed(e.to_string())
            }
        }
    }

    /// Classify an image file and record its path
    pub async fn classify_file(&self, path: &Path) -> ResultRecord {
        self.classify_file_frame(path, false).await
    }

    /// Classify an image file, flagging whether it is a live video frame
    pub async fn classify_file_frame(&self, path: &Path, is_video_frame: bool) -> ResultRecord {
        let record = match tokio::fs::read(path).await {
            Ok(bytes) => self.classify_frame(&bytes, is_video_frame).await,
            Err(e) => {
                warn!("Could not read image {:?}: {}", path, e);
                ResultRecord::failed(ClassifyError::Io(e).to_string())
            }
        };
        record.with_image_path(path)
    }

    async fn try_classify(
        &self,
        image_bytes: &[u8],
        options: &ClassifyOptions,
    ) -> Result<Classification, ClassifyError> {
        let bytes = image_bytes.to_vec();
        let image = tokio::task::spawn_blocking(move || decode_image(&bytes))
            .await
            .map_err(|e| ClassifyError::Decode(format!("decode task failed: {}", e)))??;

        let classification = self.backend.infer(&image, options).await?;
        classification.validate().map_err(|reason| {
            ClassifyError::Inference(format!("{} returned {}", self.backend.name(), reason))
        })?;
        Ok(classification)
    }
}
