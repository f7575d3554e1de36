//! Classifier error kinds

use thiserror::Error;

/// Why a classification failed.
///
/// These never leave [`super::ClassifierClient`]; the client turns them into
/// error records.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Unsupported image format: {0}. Allowed types: PNG, JPG, JPEG, BMP")]
    UnsupportedFormat(String),
    #[error("Model not loaded: {0}")]
    ModelUnavailable(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClassifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClassifyError::Network(format!("request timed out: {}", e))
        } else {
            ClassifyError::Network(e.to_string())
        }
    }
}

impl From<ort::Error> for ClassifyError {
    fn from(e: ort::Error) -> Self {
        ClassifyError::Inference(e.to_string())
    }
}

impl From<image::ImageError> for ClassifyError {
    fn from(e: image::ImageError) -> Self {
        ClassifyError::Decode(e.to_string())
    }
}
