//! Model handle for ONNX Runtime
//!
//! The on-device model is loaded on first use and kept until the handle is
//! unloaded or dropped. A failed load is not cached, so a model file that
//! appears later is picked up by the next classification.

use anyhow::Context;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::ClassifyError;

/// File name of the model inside the models directory
pub const MODEL_FILENAME: &str = "adhesion.onnx";

/// Default location of the on-device model
pub fn default_model_path() -> anyhow::Result<PathBuf> {
    let models_dir = crate::storage::get_data_dir()?.join("models");
    std::fs::create_dir_all(&models_dir)?;
    Ok(models_dir.join(MODEL_FILENAME))
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file
    pub fn new(model_path: &Path) -> Result<Self, ClassifyError> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = build_session(model_path)
            .map_err(|e| ClassifyError::ModelUnavailable(format!("incompatible model: {:#}", e)))?;

        let input_names: Vec<String> = session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect();

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();

        if input_names.is_empty() || output_names.is_empty() {
            return Err(ClassifyError::ModelUnavailable(
                "model has no inputs or outputs".to_string(),
            ));
        }

        info!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}",
            input_names, output_names
        );

        Ok(Self {
            session,
            input_names,
            output_names,
        })
    }

    /// Run the model on a single input tensor and return the first output flattened
    pub fn run(&mut self, tensor: Array4<f32>) -> Result<Vec<f32>, ClassifyError> {
        let value = Value::from_array(tensor)?;
        let input_name = self.input_names[0].as_str();
        let output_name = self.output_names[0].as_str();

        let outputs = self.session.run(ort::inputs![input_name => value])?;
        let scores = outputs[output_name].try_extract_array::<f32>()?;

        Ok(scores.iter().copied().collect())
    }

    /// Get input names
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Get output names
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

fn build_session(model_path: &Path) -> anyhow::Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(model_path)
        .context("Failed to load ONNX model")?;
    Ok(session)
}

/// Lazily loaded, explicitly owned model.
///
/// Share it between classifiers with an `Arc`.
pub struct ModelHandle {
    path: PathBuf,
    expected_sha256: Option<String>,
    session: Mutex<Option<OnnxSession>>,
}

impl ModelHandle {
    /// Create a handle; nothing is read until the first inference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            expected_sha256: None,
            session: Mutex::new(None),
        }
    }

    /// Require the artifact to match a SHA-256 checksum (hex) before loading
    pub fn with_checksum(mut self, sha256: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256.into().to_lowercase());
        self
    }

    /// Path of the model artifact
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the model is currently loaded
    pub fn is_loaded(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Load the model now instead of on first use
    pub fn load(&self) -> Result<(), ClassifyError> {
        let mut guard = self.session.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        Ok(())
    }

    /// Run inference, loading the model first if needed. Blocks the caller
    pub fn run(&self, tensor: Array4<f32>) -> Result<Vec<f32>, ClassifyError> {
        let mut guard = self.session.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        match guard.as_mut() {
            Some(session) => session.run(tensor),
            None => Err(ClassifyError::ModelUnavailable(self.path.display().to_string())),
        }
    }

    /// Drop the loaded session, if any
    pub fn unload(&self) {
        if self.session.lock().take().is_some() {
            info!("Unloaded model {:?}", self.path);
        }
    }

    fn open(&self) -> Result<OnnxSession, ClassifyError> {
        if !self.path.is_file() {
            warn!("Model artifact missing at {:?}", self.path);
            return Err(ClassifyError::ModelUnavailable(format!(
                "model file not found at {}",
                self.path.display()
            )));
        }

        if let Some(expected) = &self.expected_sha256 {
            let data = std::fs::read(&self.path)?;
            let hash = format!("{:x}", Sha256::digest(&data));
            if &hash != expected {
                return Err(ClassifyError::ModelUnavailable(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    self.path.display(),
                    expected,
                    hash
                )));
            }
            debug!("Checksum verified for {:?}", self.path);
        }

        OnnxSession::new(&self.path)
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        self.unload();
    }
}
