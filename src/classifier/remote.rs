//! Remote classification over HTTP
//!
//! Uploads a compressed copy of the image to `POST /predict` as multipart
//! form data and reads back `{prediction, probability, graph_data}`.

use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::error::ClassifyError;
use super::record::{Classification, Prediction};
use super::{Classifier, ClassifyOptions};
use crate::config::ClassifierSettings;

/// Body of a `/predict` response
#[derive(Debug, Deserialize)]
struct PredictResponse {
    prediction: String,
    probability: f64,
    #[serde(default)]
    graph_data: Vec<f64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Body of a `/health` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
    pub version: String,
}

/// HTTP classifier client
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
    max_dimension: u32,
    jpeg_quality: u8,
    scratch_dir: Option<PathBuf>,
}

impl RemoteClassifier {
    /// Create a client for the endpoint in `settings`.
    ///
    /// Temporary upload files go to `scratch_dir`, or the system temp
    /// directory when unset.
    pub fn new(settings: &ClassifierSettings, scratch_dir: Option<PathBuf>) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            max_dimension: settings.upload_max_dimension.max(1),
            jpeg_quality: settings.upload_jpeg_quality.clamp(1, 100),
            scratch_dir,
        })
    }

    /// Base URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    /// Query `GET /health`
    pub async fn health(&self) -> Result<HealthStatus, ClassifyError> {
        let response = self.client.get(self.url("health")).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(server_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| ClassifyError::InvalidResponse(e.to_string()))
    }
}

/// Downscale and JPEG-encode the image through a temporary file.
///
/// The file is removed when this returns, whether encoding succeeded or not.
fn compress(
    image: &DynamicImage,
    max_dimension: u32,
    jpeg_quality: u8,
    scratch_dir: Option<&Path>,
) -> Result<Vec<u8>, ClassifyError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("adhesio-upload-").suffix(".jpg");
    let mut file = match scratch_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    let resized = if image.width() > max_dimension || image.height() > max_dimension {
        image.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        image.clone()
    };
    let rgb = resized.to_rgb8();

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        JpegEncoder::new_with_quality(&mut writer, jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| ClassifyError::Io(std::io::Error::other(e)))?;
        writer.flush()?;
    }

    let bytes = std::fs::read(file.path())?;
    debug!(
        "Compressed {}x{} image to {} bytes at {:?}",
        rgb.width(),
        rgb.height(),
        bytes.len(),
        file.path()
    );
    Ok(bytes)
}

#[async_trait]
impl Classifier for RemoteClassifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn infer(
        &self,
        image: &DynamicImage,
        options: &ClassifyOptions,
    ) -> Result<Classification, ClassifyError> {
        let image = image.clone();
        let max_dimension = self.max_dimension;
        let jpeg_quality = self.jpeg_quality;
        let scratch_dir = self.scratch_dir.clone();
        let jpeg = tokio::task::spawn_blocking(move || {
            compress(&image, max_dimension, jpeg_quality, scratch_dir.as_deref())
        })
        .await
        .map_err(|e| ClassifyError::Inference(format!("compression task failed: {}", e)))??;
        let size = jpeg.len();

        let part = Part::bytes(jpeg)
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("image", part).text(
            "is_video_frame",
            if options.is_video_frame { "true" } else { "false" },
        );

        info!("Uploading {} bytes to {}", size, self.url("predict"));
        let response = self
            .client
            .post(self.url("predict"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        interpret_response(status.as_u16(), &body)
    }
}

/// Turn a `/predict` status and body into a classification
pub fn interpret_response(status: u16, body: &str) -> Result<Classification, ClassifyError> {
    if !(200..300).contains(&status) {
        return Err(server_error(status, body));
    }

    let response: PredictResponse =
        serde_json::from_str(body).map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(ClassifyError::Server { status, message: error });
    }

    let prediction = match response.prediction.as_str() {
        "Yes" | "Adhesion Present" => Prediction::AdhesionPresent,
        "No" | "No Adhesion" => Prediction::NoAdhesion,
        other => {
            return Err(ClassifyError::InvalidResponse(format!(
                "unknown prediction label '{}'",
                other
            )))
        }
    };

    if !(0.0..=1.0).contains(&response.probability) {
        return Err(ClassifyError::InvalidResponse(format!(
            "probability {} outside 0-1",
            response.probability
        )));
    }

    let scores = if response.graph_data.is_empty() {
        vec![1.0 - response.probability, response.probability]
    } else {
        response.graph_data
    };

    Ok(Classification {
        prediction,
        probability: response.probability,
        scores,
    })
}

fn server_error(status: u16, body: &str) -> ClassifyError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });

    ClassifyError::Server { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode, routing::{get, post}, Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn settings(endpoint: &str) -> ClassifierSettings {
        ClassifierSettings {
            endpoint: endpoint.to_string(),
            timeout_secs: 5,
            ..ClassifierSettings::default()
        }
    }

    fn sample_image() -> DynamicImage {
        DynamicImage::new_rgb8(64, 48)
    }

    #[test]
    fn test_interpret_success() {
        let body = r#"{"prediction":"Yes","probability":0.91,"graph_data":[0.09,0.91],"message":"Prediction successful"}"#;
        let c = interpret_response(200, body).unwrap();

        assert_eq!(c.prediction, Prediction::AdhesionPresent);
        assert_eq!(c.probability, 0.91);
        assert_eq!(c.scores, vec![0.09, 0.91]);
    }

    #[test]
    fn test_interpret_server_error() {
        let err = interpret_response(500, r#"{"error":"bad image"}"#).unwrap_err();

        assert!(matches!(err, ClassifyError::Server { status: 500, .. }));
        assert!(err.to_string().contains("bad image"));
    }

    #[test]
    fn test_interpret_non_json_error() {
        let err = interpret_response(502, "Bad Gateway").unwrap_err();
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_interpret_unknown_label() {
        let err = interpret_response(200, r#"{"prediction":"Maybe","probability":0.5}"#).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidResponse(_)));
    }

    #[test]
    fn test_interpret_missing_graph_data() {
        let c = interpret_response(200, r#"{"prediction":"No","probability":0.25}"#).unwrap();
        assert_eq!(c.prediction, Prediction::NoAdhesion);
        assert_eq!(c.scores, vec![0.75, 0.25]);
    }

    #[tokio::test]
    async fn test_predict_uploads_multipart() {
        let router = Router::new().route(
            "/predict",
            post(|mut multipart: Multipart| async move {
                let mut has_image = false;
                let mut video_flag = String::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    let name = field.name().map(str::to_string);
                    match name.as_deref() {
                        Some("image") => {
                            let bytes = field.bytes().await.unwrap();
                            has_image = image::guess_format(&bytes).ok() == Some(image::ImageFormat::Jpeg);
                        }
                        Some("is_video_frame") => video_flag = field.text().await.unwrap(),
                        _ => {}
                    }
                }

                if has_image && video_flag == "true" {
                    (StatusCode::OK, Json(json!({
                        "prediction": "No",
                        "probability": 0.2,
                        "graph_data": [0.8, 0.2]
                    })))
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({"error": "No image file provided"})))
                }
            }),
        );
        let endpoint = serve(router).await;
        let classifier = RemoteClassifier::new(&settings(&endpoint), None).unwrap();

        let c = classifier
            .infer(&sample_image(), &ClassifyOptions { is_video_frame: true })
            .await
            .unwrap();

        assert_eq!(c.prediction, Prediction::NoAdhesion);
        assert_eq!(c.scores, vec![0.8, 0.2]);
    }

    #[tokio::test]
    async fn test_predict_server_error() {
        let router = Router::new().route(
            "/predict",
            post(|| async {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "bad image"})))
            }),
        );
        let endpoint = serve(router).await;
        let classifier = RemoteClassifier::new(&settings(&endpoint), None).unwrap();

        let err = classifier
            .infer(&sample_image(), &ClassifyOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bad image"));
    }

    #[tokio::test]
    async fn test_upload_files_are_removed() {
        let scratch = tempfile::tempdir().unwrap();
        let router = Router::new().route(
            "/predict",
            post(|| async { Json(json!({"prediction": "Yes", "probability": 0.6})) }),
        );
        let endpoint = serve(router).await;
        let classifier =
            RemoteClassifier::new(&settings(&endpoint), Some(scratch.path().to_path_buf())).unwrap();

        classifier
            .infer(&sample_image(), &ClassifyOptions::default())
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_compress_downscales_to_jpeg() {
        let scratch = tempfile::tempdir().unwrap();
        let image = DynamicImage::new_rgb8(400, 100);

        let jpeg = compress(&image, 200, 85, Some(scratch.path())).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), image::ImageFormat::Jpeg);
        assert_eq!((decoded.width(), decoded.height()), (200, 50));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let classifier = RemoteClassifier::new(&settings(&endpoint), None).unwrap();
        let err = classifier
            .infer(&sample_image(), &ClassifyOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ClassifyError::Network(_)));
    }

    #[tokio::test]
    async fn test_health() {
        let router = Router::new().route(
            "/health",
            get(|| async {
                Json(json!({
                    "status": "healthy",
                    "message": "AdhesioSense AI Server is running",
                    "version": "1.0.0"
                }))
            }),
        );
        let endpoint = serve(router).await;
        let classifier = RemoteClassifier::new(&settings(&format!("{}/", endpoint)), None).unwrap();

        let health = classifier.health().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.version, "1.0.0");
    }
}
