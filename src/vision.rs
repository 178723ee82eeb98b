//! # Cloud Text Detection
//!
//! `OcrEngine` backed by the Google Cloud Vision `images:annotate` REST method
//! with the `TEXT_DETECTION` feature. The first text annotation holds the full
//! detected text; no annotation means nothing was detected.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::error_logging;
use crate::errors::{AppError, AppResult};
use crate::observability;
use crate::ocr::{OcrEngine, OcrFuture};
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ServiceStatus {
    #[serde(default)]
    message: String,
}

/// Request body for a single-image text detection call
pub fn build_annotate_request(image_png: &[u8]) -> serde_json::Value {
    json!({
        "requests": [{
            "image": { "content": STANDARD.encode(image_png) },
            "features": [{ "type": "TEXT_DETECTION" }]
        }]
    })
}

/// Extracts the detected text from an `images:annotate` response body.
///
/// An error object in the per-image response becomes `OcrError::Service`
/// carrying the service's message.
pub fn parse_annotate_response(body: &str) -> Result<String, OcrError> {
    let parsed: AnnotateResponse = serde_json::from_str(body)
        .map_err(|e| OcrError::Service(format!("Malformed annotate response: {}", e)))?;

    let Some(first) = parsed.responses.into_iter().next() else {
        return Ok(String::new());
    };
    if let Some(status) = first.error {
        return Err(OcrError::Service(status.message));
    }

    Ok(first
        .text_annotations
        .into_iter()
        .next()
        .map(|a| a.description)
        .unwrap_or_default())
}

/// Cloud OCR engine, guarded by a circuit breaker.
pub struct CloudVisionEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    breaker: CircuitBreaker,
}

impl CloudVisionEngine {
    /// Builds the engine from OCR configuration.
    ///
    /// # Errors
    ///
    /// `AppError::Config` when no API key is configured, `AppError::Network`
    /// when the HTTP client cannot be built.
    pub fn from_config(config: &OcrConfig) -> AppResult<Self> {
        let api_key = config.vision.api_key.clone().ok_or_else(|| {
            AppError::Config("GOOGLE_VISION_API_KEY is required for cloud OCR".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.vision.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.vision.endpoint.clone(),
            api_key,
            breaker: CircuitBreaker::new(&config.recovery),
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn annotate(&self, image_png: &[u8]) -> Result<String, OcrError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&build_annotate_request(image_png))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error_logging::log_network_error(
                &format!("HTTP {}", status),
                "images_annotate",
                Some(self.endpoint.as_str()),
                Some(status.as_u16()),
            );
            return Err(OcrError::Service(format!(
                "Text detection request failed with HTTP {}",
                status
            )));
        }

        parse_annotate_response(&body)
    }
}

impl OcrEngine for CloudVisionEngine {
    fn name(&self) -> &'static str {
        "cloud_vision"
    }

    fn recognize<'a>(&'a self, image_png: &'a [u8]) -> OcrFuture<'a> {
        Box::pin(async move {
            if self.breaker.is_open() {
                warn!("Circuit breaker is open, skipping cloud OCR");
                observability::update_circuit_breaker_state(true);
                return Err(OcrError::Unavailable(
                    "Cloud OCR is temporarily disabled after repeated failures".to_string(),
                ));
            }

            let result = self.annotate(image_png).await;
            match &result {
                Ok(text) => {
                    self.breaker.record_success();
                    debug!(chars = text.len(), "Cloud text detection succeeded");
                }
                Err(e) => {
                    self.breaker.record_failure();
                    warn!(
                        error = %e,
                        consecutive_failures = self.breaker.failure_count(),
                        "Cloud text detection failed"
                    );
                }
            }
            observability::update_circuit_breaker_state(self.breaker.is_open());
            result
        })
    }
}
