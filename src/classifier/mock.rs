//! Development-only mock classifier
//!
//! Never backs a production client: [`super::ClassifierClient::from_config`]
//! only builds it when development mode is enabled.

use async_trait::async_trait;
use image::DynamicImage;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use super::error::ClassifyError;
use super::record::{Classification, Prediction};
use super::{Classifier, ClassifyOptions};

/// The two outcomes the mock can return
pub const MOCK_RESULTS: [(Prediction, f64); 2] = [
    (Prediction::AdhesionPresent, 0.87),
    (Prediction::NoAdhesion, 0.13),
];

/// Returns one of [`MOCK_RESULTS`] at random
pub struct MockClassifier {
    rng: Mutex<StdRng>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic sequence of results
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn infer(
        &self,
        _image: &DynamicImage,
        _options: &ClassifyOptions,
    ) -> Result<Classification, ClassifyError> {
        warn!("Mock classifier in use: result is not a real prediction");

        let index = self.rng.lock().random_range(0..MOCK_RESULTS.len());
        let (prediction, probability) = MOCK_RESULTS[index];

        Ok(Classification {
            prediction,
            probability,
            scores: vec![1.0 - probability, probability],
        })
    }
}
