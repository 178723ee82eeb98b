//! # OCR Processing Module
//!
//! Text recognition over preprocessed label images.
//!
//! ## Features
//!
//! - `OcrEngine` trait shared by the cloud service and the local engine
//! - Local recognition with Tesseract (via `leptess`) on a blocking thread
//! - Per-call timeout protection
//! - Primary/fallback orchestration: the local engine only runs when the
//!   primary produced no text
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica
//! - `tempfile`: on-disk staging of the image handed to Tesseract
//! - `tokio`: blocking-task offload and timeouts

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn, Instrument};

use crate::errors::error_logging;
pub use crate::instance_manager::OcrInstanceManager;
use crate::observability;
pub use crate::ocr_config::OcrConfig;
pub use crate::ocr_errors::OcrError;

/// Future returned by [`OcrEngine::recognize`]
pub type OcrFuture<'a> = Pin<Box<dyn Future<Output = Result<String, OcrError>> + Send + 'a>>;

/// A text recognition backend.
///
/// Implementations receive a PNG-encoded, preprocessed image and return the
/// detected text. Empty or whitespace-only text is a valid "nothing detected"
/// answer, not an error.
pub trait OcrEngine: Send + Sync {
    /// Short engine name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Recognizes the text in a PNG image
    fn recognize<'a>(&'a self, image_png: &'a [u8]) -> OcrFuture<'a>;
}

/// Local Tesseract engine.
///
/// The image is staged in a temporary file which is removed when the
/// recognition task finishes, whether it succeeded, failed, or outlived its
/// timeout.
pub struct TesseractEngine {
    config: OcrConfig,
    instances: Arc<OcrInstanceManager>,
}

impl TesseractEngine {
    pub fn new(config: OcrConfig, instances: Arc<OcrInstanceManager>) -> Self {
        Self { config, instances }
    }

    async fn run(&self, image_png: &[u8]) -> Result<String, OcrError> {
        let instance = self
            .instances
            .get_instance(&self.config)
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        let mut staged = tempfile::Builder::new()
            .prefix("nutrition-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Extraction(format!("Failed to stage image: {}", e)))?;
        staged
            .write_all(image_png)
            .and_then(|_| staged.flush())
            .map_err(|e| OcrError::Extraction(format!("Failed to stage image: {}", e)))?;

        let timeout_secs = self.config.recovery.operation_timeout_secs;
        let task = tokio::task::spawn_blocking(move || {
            let mut tess = instance.lock();
            tess.set_image(staged.path()).map_err(|e| {
                OcrError::InvalidImage(format!("Failed to load image for OCR: {}", e))
            })?;
            let text = tess.get_utf8_text().map_err(|e| {
                OcrError::Extraction(format!("Failed to extract text from image: {}", e))
            })?;
            drop(staged);
            Ok(text)
        });

        match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(OcrError::Extraction(format!(
                "Tesseract task failed: {}",
                join_error
            ))),
            Err(_) => Err(OcrError::Timeout(format!(
                "OCR operation timed out after {} seconds",
                timeout_secs
            ))),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize<'a>(&'a self, image_png: &'a [u8]) -> OcrFuture<'a> {
        Box::pin(self.run(image_png))
    }
}

/// Runs one engine with span, metrics and error logging around the call.
pub async fn run_engine(engine: &dyn OcrEngine, image_png: &[u8]) -> Result<String, OcrError> {
    let span = observability::ocr_span(engine.name());
    async {
        let start_time = Instant::now();
        let result = engine.recognize(image_png).await;
        let duration = start_time.elapsed();

        observability::record_ocr_metrics(
            engine.name(),
            result.is_ok(),
            duration,
            image_png.len() as u64,
        );

        match &result {
            Ok(text) => info!(
                engine = engine.name(),
                chars = text.len(),
                "OCR completed in {}ms",
                duration.as_millis()
            ),
            Err(err) => error_logging::log_ocr_error(
                err,
                engine.name(),
                "recognize",
                Some(image_png.len()),
                Some(duration),
            ),
        }
        result
    }
    .instrument(span)
    .await
}

/// Text produced by the OCR stage and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutcome {
    pub text: String,
    /// Engine that produced `text`, `None` when no engine yielded text
    pub engine: Option<&'static str>,
    pub used_fallback: bool,
}

impl OcrOutcome {
    fn empty(used_fallback: bool) -> Self {
        Self {
            text: String::new(),
            engine: None,
            used_fallback,
        }
    }
}

/// Recognizes an image with an optional primary engine and optional fallback.
///
/// Exactly one primary attempt is made. Service errors are logged and treated
/// as "no text". The fallback runs strictly after the primary, and only when
/// the primary is absent, failed, or returned blank text.
pub async fn recognize_with_fallback(
    primary: Option<&dyn OcrEngine>,
    fallback: Option<&dyn OcrEngine>,
    image_png: &[u8],
) -> OcrOutcome {
    if let Some(engine) = primary {
        match run_engine(engine, image_png).await {
            Ok(text) if !text.trim().is_empty() => {
                return OcrOutcome {
                    text,
                    engine: Some(engine.name()),
                    used_fallback: false,
                };
            }
            Ok(_) => debug!(engine = engine.name(), "Primary OCR returned no text"),
            Err(err) => warn!(engine = engine.name(), error = %err, "Primary OCR failed"),
        }
    }

    let Some(engine) = fallback else {
        return OcrOutcome::empty(false);
    };

    info!(engine = engine.name(), "Falling back to local OCR");
    match run_engine(engine, image_png).await {
        Ok(text) if !text.trim().is_empty() => OcrOutcome {
            text,
            engine: Some(engine.name()),
            used_fallback: true,
        },
        Ok(_) => OcrOutcome::empty(true),
        Err(err) => {
            warn!(engine = engine.name(), error = %err, "Fallback OCR failed");
            OcrOutcome::empty(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubEngine {
        name: &'static str,
        reply: Result<String, OcrError>,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn new(name: &'static str, reply: Result<&str, OcrError>) -> Self {
            Self {
                name,
                reply: reply.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl OcrEngine for StubEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        fn recognize<'a>(&'a self, _image_png: &'a [u8]) -> OcrFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    #[tokio::test]
    async fn test_primary_text_skips_fallback() {
        let primary = StubEngine::new("cloud", Ok("Sodium 200mg"));
        let fallback = StubEngine::new("local", Ok("other"));

        let outcome = recognize_with_fallback(Some(&primary), Some(&fallback), b"png").await;
        assert_eq!(outcome.text, "Sodium 200mg");
        assert_eq!(outcome.engine, Some("cloud"));
        assert!(!outcome.used_fallback);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_primary_triggers_fallback() {
        let primary = StubEngine::new("cloud", Ok("  \n"));
        let fallback = StubEngine::new("local", Ok("Protein 3g"));

        let outcome = recognize_with_fallback(Some(&primary), Some(&fallback), b"png").await;
        assert_eq!(outcome.text, "Protein 3g");
        assert_eq!(outcome.engine, Some("local"));
        assert!(outcome.used_fallback);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_primary_error_is_swallowed() {
        let primary = StubEngine::new("cloud", Err(OcrError::Service("quota".to_string())));

        let outcome = recognize_with_fallback(Some(&primary), None, b"png").await;
        assert_eq!(outcome, OcrOutcome::empty(false));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_fallback_yields_empty_text() {
        let primary = StubEngine::new("cloud", Ok(""));
        let fallback = StubEngine::new("local", Err(OcrError::Timeout("slow".to_string())));

        let outcome = recognize_with_fallback(Some(&primary), Some(&fallback), b"png").await;
        assert_eq!(outcome.text, "");
        assert_eq!(outcome.engine, None);
        assert!(outcome.used_fallback);
    }

    #[tokio::test]
    async fn test_local_only() {
        let local = StubEngine::new("local", Ok("Servings: 2"));
        let outcome = recognize_with_fallback(None, Some(&local), b"png").await;
        assert_eq!(outcome.text, "Servings: 2");
        assert!(outcome.used_fallback);
    }
}
