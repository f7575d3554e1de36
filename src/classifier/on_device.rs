//! On-device classification with the ONNX model

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

use super::error::ClassifyError;
use super::models::ModelHandle;
use super::preprocess::{preprocess_image, PreprocessConfig};
use super::record::{Classification, Prediction};
use super::{Classifier, ClassifyOptions};

/// Runs the shared model on the blocking thread pool
pub struct OnDeviceClassifier {
    model: Arc<ModelHandle>,
    preprocess: PreprocessConfig,
}

impl OnDeviceClassifier {
    pub fn new(model: Arc<ModelHandle>, preprocess: PreprocessConfig) -> Self {
        Self { model, preprocess }
    }

    /// The model this classifier runs
    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }
}

#[async_trait]
impl Classifier for OnDeviceClassifier {
    fn name(&self) -> &'static str {
        "on_device"
    }

    async fn infer(
        &self,
        image: &DynamicImage,
        _options: &ClassifyOptions,
    ) -> Result<Classification, ClassifyError> {
        let model = self.model.clone();
        let config = self.preprocess.clone();
        let image = image.clone();

        let scores = tokio::task::spawn_blocking(move || {
            let tensor = preprocess_image(&image, &config)?;
            model.run(tensor)
        })
        .await
        .map_err(|e| ClassifyError::Inference(format!("inference task failed: {}", e)))??;

        debug!("Model output: {:?}", scores);
        scores_to_classification(&scores)
    }
}

/// Interpret raw model output.
///
/// One value is the adhesion probability. Two or more are per-class scores
/// ordered `[no_adhesion, adhesion, ..]`; values outside 0-1 are treated as
/// logits and passed through softmax first. NaN or infinite output is an
/// inference error.
pub fn scores_to_classification(raw: &[f32]) -> Result<Classification, ClassifyError> {
    if let Some(bad) = raw.iter().find(|v| !v.is_finite()) {
        return Err(ClassifyError::Inference(format!(
            "model produced non-finite output {}",
            bad
        )));
    }

    match raw {
        [] => Err(ClassifyError::Inference("model produced no output".to_string())),
        [p] => Ok(Classification::from_adhesion_probability(*p as f64)),
        _ => {
            let mut scores: Vec<f64> = raw.iter().map(|&v| v as f64).collect();
            if scores.iter().any(|v| !(0.0..=1.0).contains(v)) {
                scores = softmax(&scores);
            }

            let best = scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);

            let prediction = if best == 1 {
                Prediction::AdhesionPresent
            } else {
                Prediction::NoAdhesion
            };

            Ok(Classification {
                prediction,
                probability: scores[1].clamp(0.0, 1.0),
                scores,
            })
        }
    }
}

fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_output() {
        let c = scores_to_classification(&[0.8]).unwrap();
        assert_eq!(c.prediction, Prediction::AdhesionPresent);
        assert!((c.probability - 0.8).abs() < 1e-6);
        assert_eq!(c.scores.len(), 2);
    }

    #[test]
    fn test_two_class_probabilities() {
        let c = scores_to_classification(&[0.7, 0.3]).unwrap();
        assert_eq!(c.prediction, Prediction::NoAdhesion);
        assert!((c.probability - 0.3).abs() < 1e-6);
        assert_eq!(c.scores.len(), 2);
    }

    #[test]
    fn test_logits_go_through_softmax() {
        let c = scores_to_classification(&[-2.0, 3.0]).unwrap();
        assert_eq!(c.prediction, Prediction::AdhesionPresent);
        assert!(c.probability > 0.99 && c.probability <= 1.0);
        assert!((c.scores.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_output() {
        assert!(matches!(
            scores_to_classification(&[]),
            Err(ClassifyError::Inference(_))
        ));
    }

    #[test]
    fn test_non_finite_output_is_rejected() {
        for raw in [
            vec![f32::NAN],
            vec![f32::INFINITY, 0.2],
            vec![0.1, f32::NEG_INFINITY],
        ] {
            assert!(
                matches!(scores_to_classification(&raw), Err(ClassifyError::Inference(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_large_logits_stay_finite() {
        let c = scores_to_classification(&[1.0e30, -1.0e30]).unwrap();
        assert_eq!(c.prediction, Prediction::NoAdhesion);
        assert!(c.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_model_reports_unavailable() {
        let classifier = OnDeviceClassifier::new(
            Arc::new(ModelHandle::new("/nonexistent/adhesion.onnx")),
            PreprocessConfig::default(),
        );
        let image = DynamicImage::new_rgb8(32, 32);

        let err = classifier
            .infer(&image, &ClassifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::ModelUnavailable(_)));
        assert!(err.to_string().starts_with("Model not loaded"));
    }
}
