//! Result records produced by the classifier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    #[serde(rename = "Adhesion Present")]
    AdhesionPresent,
    #[serde(rename = "No Adhesion")]
    NoAdhesion,
    /// Sentinel for failed classifications
    #[serde(rename = "Error")]
    Error,
}

impl Prediction {
    /// Display label, identical to the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            Prediction::AdhesionPresent => "Adhesion Present",
            Prediction::NoAdhesion => "No Adhesion",
            Prediction::Error => "Error",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Check that a probability and score vector can be stored and read back.
///
/// JSON has no NaN or infinity, so a single non-finite value would make the
/// whole stored history unreadable.
pub(crate) fn check_scores(probability: f64, scores: &[f64]) -> Result<(), String> {
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(format!("probability {} outside 0-1", probability));
    }
    if scores.is_empty() {
        return Err("empty score vector".to_string());
    }
    if let Some(bad) = scores.iter().find(|v| !v.is_finite()) {
        return Err(format!("non-finite score {}", bad));
    }
    Ok(())
}

/// Outcome of a single inference, before it becomes a record
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub prediction: Prediction,
    /// Probability of the adhesion class
    pub probability: f64,
    /// Per-class scores, `[no_adhesion, adhesion, ..]`
    pub scores: Vec<f64>,
}

impl Classification {
    /// Build a two-class classification from the adhesion probability
    pub fn from_adhesion_probability(probability: f64) -> Self {
        let probability = probability.clamp(0.0, 1.0);
        let prediction = if probability > 0.5 {
            Prediction::AdhesionPresent
        } else {
            Prediction::NoAdhesion
        };

        Self {
            prediction,
            probability,
            scores: vec![1.0 - probability, probability],
        }
    }

    /// Probability in 0-1 and a non-empty, finite score vector
    pub fn validate(&self) -> Result<(), String> {
        check_scores(self.probability, &self.scores)
    }
}

/// One completed classification.
///
/// Records are immutable once created; the store replaces a record by
/// deleting and reinserting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    pub prediction: Prediction,
    pub probability: f64,
    #[serde(rename = "graph_data")]
    pub score_vector: Vec<f64>,
    pub image_path: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    /// Create a record for a successful classification
    pub fn from_classification(classification: Classification) -> Self {
        let Classification {
            prediction,
            probability,
            mut scores,
        } = classification;

        if scores.is_empty() {
            scores = vec![1.0 - probability, probability];
        }

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prediction,
            probability,
            score_vector: scores,
            image_path: String::new(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Create an error record carrying `message`
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prediction: Prediction::Error,
            probability: 0.0,
            score_vector: vec![0.0, 0.0],
            image_path: String::new(),
            timestamp: Utc::now(),
            error: Some(message.into()),
        }
    }

    /// Attach the path of the image this record describes
    pub fn with_image_path(mut self, path: &Path) -> Self {
        self.image_path = path.to_string_lossy().into_owned();
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Check the fields the store relies on
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("empty id".to_string());
        }
        check_scores(self.probability, &self.score_vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_labels() {
        assert_eq!(Prediction::AdhesionPresent.to_string(), "Adhesion Present");
        assert_eq!(
            serde_json::to_string(&Prediction::NoAdhesion).unwrap(),
            "\"No Adhesion\""
        );
        let parsed: Prediction = serde_json::from_str("\"Error\"").unwrap();
        assert_eq!(parsed, Prediction::Error);
    }

    #[test]
    fn test_from_adhesion_probability() {
        let yes = Classification::from_adhesion_probability(0.75);
        assert_eq!(yes.prediction, Prediction::AdhesionPresent);
        assert_eq!(yes.scores, vec![0.25, 0.75]);

        let no = Classification::from_adhesion_probability(0.5);
        assert_eq!(no.prediction, Prediction::NoAdhesion);
    }

    #[test]
    fn test_failed_record_uses_sentinels() {
        let record = ResultRecord::failed("model not loaded");

        assert!(record.is_error());
        assert_eq!(record.prediction, Prediction::Error);
        assert_eq!(record.probability, 0.0);
        assert!(!record.score_vector.is_empty());
        assert_eq!(record.error.as_deref(), Some("model not loaded"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ResultRecord::from_classification(Classification::from_adhesion_probability(0.9));
        let b = ResultRecord::from_classification(Classification::from_adhesion_probability(0.9));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_json_roundtrip() {
        let record = ResultRecord::from_classification(Classification {
            prediction: Prediction::AdhesionPresent,
            probability: 0.875,
            scores: vec![0.125, 0.875],
        })
        .with_image_path(Path::new("/data/captures/frame_01.jpg"));

        let json = serde_json::to_string(&record).unwrap();
        let parsed: ResultRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, record);
    }

    #[test]
    fn test_json_field_names() {
        let record = ResultRecord::from_classification(Classification::from_adhesion_probability(0.25));
        let value = serde_json::to_value(&record).unwrap();

        for field in ["id", "prediction", "probability", "graph_data", "image_path", "timestamp"] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        assert!(value.get("error").is_none());
        assert_eq!(value["prediction"], "No Adhesion");
    }

    #[test]
    fn test_validate_rejects_unstorable_values() {
        assert!(Classification::from_adhesion_probability(0.4).validate().is_ok());
        assert!(Classification::from_adhesion_probability(f64::NAN).validate().is_err());

        let mut record = ResultRecord::from_classification(Classification::from_adhesion_probability(0.4));
        assert!(record.validate().is_ok());

        record.score_vector = vec![0.6, f64::INFINITY];
        assert!(record.validate().is_err());

        record.score_vector.clear();
        assert!(record.validate().is_err());

        record.score_vector = vec![0.6, 0.4];
        record.probability = 1.5;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_failed_record_is_valid() {
        assert!(ResultRecord::failed("bad image").validate().is_ok());
    }
}
