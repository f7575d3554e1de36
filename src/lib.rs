//! AdhesioSense - adhesion detection from camera frames
//!
//! Captures frames, classifies them with an on-device model, a remote
//! endpoint or a development mock, and keeps a history of results.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod shared;
pub mod storage;

pub use capture::{CaptureController, CaptureError, CaptureState};
pub use classifier::{ClassifierClient, ClassifyError, Prediction, ResultRecord};
pub use config::AppConfig;
pub use storage::{ResultStore, StoreError};
