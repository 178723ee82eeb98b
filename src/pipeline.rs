//! # Nutrition Pipeline
//!
//! Single-image processing: preprocess, OCR (with optional local fallback),
//! a raw extraction pass, a spell-corrected extraction pass, reconciliation,
//! and total derivation.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};

use crate::config::AppConfig;
use crate::errors::{error_logging, AppResult};
use crate::instance_manager::OcrInstanceManager;
use crate::nutrition::{derive_totals, field_source, reconcile, ExtractionResult, Field};
use crate::observability;
use crate::ocr::{recognize_with_fallback, run_engine, OcrEngine, OcrOutcome, TesseractEngine};
use crate::ocr_errors::OcrError;
use crate::preprocessing::{preprocess, PreprocessingConfig, PreprocessingError};
use crate::spell_correction::SpellCorrector;
use crate::text_processing::extract_nutrition;
use crate::vision::CloudVisionEngine;

/// Everything the pipeline learned about one image.
///
/// The per-serving fields repeat the reconciled protein, sodium and
/// carbohydrate values; totals are per-serving × servings with units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub raw_text: String,
    pub raw_extracted: ExtractionResult,
    pub spellchecked_text: String,
    pub spellchecked_extracted: ExtractionResult,
    pub final_extracted: ExtractionResult,
    pub protein_per_serving: Option<String>,
    pub sodium_per_serving: Option<String>,
    pub carbs_per_serving: Option<String>,
    pub protein_total: Option<String>,
    pub sodium_total: Option<String>,
    pub carbs_total: Option<String>,
}

impl PipelineResult {
    /// All-null result with empty texts, used for undecodable images
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn total(&self, field: Field) -> Option<&str> {
        match field {
            Field::Protein => self.protein_total.as_deref(),
            Field::Sodium => self.sodium_total.as_deref(),
            Field::Carbohydrates => self.carbs_total.as_deref(),
            Field::Servings => None,
        }
    }
}

/// Stateless text stages of the pipeline, starting from OCR output.
///
/// Extraction runs twice, on the raw text and on its spell-corrected form,
/// and the two passes are reconciled before totals are derived.
pub fn analyze_text(raw_text: &str, corrector: &SpellCorrector) -> PipelineResult {
    let raw_extracted = extract_nutrition(raw_text);
    let spellchecked_text = corrector.correct_text(raw_text);
    let spellchecked_extracted = extract_nutrition(&spellchecked_text);
    let final_extracted = reconcile(&raw_extracted, &spellchecked_extracted);

    for field in Field::ALL {
        let source = field_source(&raw_extracted, &spellchecked_extracted, field);
        observability::record_field_source(field, source);
    }
    debug!(
        raw_matches = raw_extracted.matched_count(),
        corrected_matches = spellchecked_extracted.matched_count(),
        final_matches = final_extracted.matched_count(),
        "Extraction passes reconciled"
    );

    let totals = derive_totals(&final_extracted);

    PipelineResult {
        raw_text: raw_text.to_string(),
        protein_per_serving: final_extracted.protein.clone(),
        sodium_per_serving: final_extracted.sodium.clone(),
        carbs_per_serving: final_extracted.carbohydrates.clone(),
        protein_total: totals.protein_total,
        sodium_total: totals.sodium_total,
        carbs_total: totals.carbs_total,
        raw_extracted,
        spellchecked_text,
        spellchecked_extracted,
        final_extracted,
    }
}

/// The assembled image-to-nutrition pipeline.
///
/// Holds no per-request state; one instance is shared by every image of a batch.
pub struct NutritionPipeline {
    preprocessing: PreprocessingConfig,
    corrector: SpellCorrector,
    cloud: Option<Arc<dyn OcrEngine>>,
    local: Option<Arc<dyn OcrEngine>>,
    local_fallback: bool,
}

impl NutritionPipeline {
    pub fn new(
        preprocessing: PreprocessingConfig,
        corrector: SpellCorrector,
        cloud: Option<Arc<dyn OcrEngine>>,
        local: Option<Arc<dyn OcrEngine>>,
        local_fallback: bool,
    ) -> Self {
        Self {
            preprocessing,
            corrector,
            cloud,
            local,
            local_fallback,
        }
    }

    /// Wires the cloud and Tesseract engines from application configuration.
    ///
    /// The cloud engine is only built when an API key is configured.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let corrector = SpellCorrector::new(config.spell.clone())?;

        let cloud: Option<Arc<dyn OcrEngine>> = if config.ocr.vision.api_key.is_some() {
            Some(Arc::new(CloudVisionEngine::from_config(&config.ocr)?))
        } else {
            info!("No cloud OCR API key configured, using local OCR only");
            None
        };
        let local: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::new(
            config.ocr.clone(),
            Arc::new(OcrInstanceManager::new()),
        ));

        Ok(Self::new(
            config.preprocessing.clone(),
            corrector,
            cloud,
            Some(local),
            config.ocr.enable_local_fallback,
        ))
    }

    pub fn corrector(&self) -> &SpellCorrector {
        &self.corrector
    }

    /// Primary and fallback engines for one request
    fn engines(&self, use_cloud: bool) -> (Option<&dyn OcrEngine>, Option<&dyn OcrEngine>) {
        let local = self.local.as_deref();
        if !use_cloud {
            return (local, None);
        }
        match self.cloud.as_deref() {
            Some(cloud) => (Some(cloud), local.filter(|_| self.local_fallback)),
            None => {
                warn!("Cloud OCR requested but not configured, using local OCR");
                (local, None)
            }
        }
    }

    /// Runs OCR over an already preprocessed PNG
    async fn recognize(&self, image_png: &[u8], use_cloud: bool) -> OcrOutcome {
        let (primary, fallback) = self.engines(use_cloud);
        recognize_with_fallback(primary, fallback, image_png).await
    }

    /// Processes one uploaded image end to end.
    ///
    /// Never fails: undecodable input yields [`PipelineResult::empty`] without
    /// any OCR call, and OCR failures degrade to empty text.
    pub async fn process_image(&self, image_bytes: &[u8], use_cloud: bool) -> PipelineResult {
        let span = observability::pipeline_span("process_image", image_bytes.len());
        async {
            let start_time = Instant::now();

            let raw = image_bytes.to_vec();
            let preprocessing = self.preprocessing.clone();
            let prepared = tokio::task::spawn_blocking(move || preprocess(&raw, &preprocessing))
                .await
                .unwrap_or_else(|e| {
                    Err(PreprocessingError::ProcessingFailed {
                        message: format!("Preprocessing task failed: {}", e),
                    })
                });

            let prepared = match prepared {
                Ok(prepared) => prepared,
                Err(err) => {
                    let err = OcrError::from(err);
                    error_logging::log_pipeline_error(&err, "preprocess", None);
                    observability::record_pipeline_metrics("invalid_image", start_time.elapsed(), 0);
                    return PipelineResult::empty();
                }
            };

            let outcome = self.recognize(&prepared.png_bytes, use_cloud).await;
            let result = analyze_text(&outcome.text, &self.corrector);

            let matched = result.final_extracted.matched_count();
            observability::record_pipeline_metrics("processed", start_time.elapsed(), matched);
            info!(
                engine = ?outcome.engine,
                used_fallback = outcome.used_fallback,
                text_chars = outcome.text.len(),
                fields_matched = matched,
                "Image processed in {}ms",
                start_time.elapsed().as_millis()
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Returns only the detected text of an upload, without preprocessing or extraction.
    ///
    /// Unlike [`process_image`](Self::process_image) engine errors are returned to the caller.
    pub async fn detect_text(&self, image_bytes: &[u8], use_cloud: bool) -> Result<String, OcrError> {
        let (primary, _) = self.engines(use_cloud);
        let engine = primary
            .ok_or_else(|| OcrError::Unavailable("No OCR engine is configured".to_string()))?;
        run_engine(engine, image_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrFuture;
    use crate::spell_correction::SpellCheckConfig;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTextEngine {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl FixedTextEngine {
        fn new(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                text,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl OcrEngine for FixedTextEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn recognize<'a>(&'a self, _image_png: &'a [u8]) -> OcrFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = self.text.to_string();
            Box::pin(async move { Ok(text) })
        }
    }

    fn corrector() -> SpellCorrector {
        SpellCorrector::new(SpellCheckConfig::default()).unwrap()
    }

    fn small_png() -> Vec<u8> {
        let img = GrayImage::from_pixel(32, 24, Luma([200]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pipeline_with(cloud: Arc<FixedTextEngine>, local: Arc<FixedTextEngine>) -> NutritionPipeline {
        NutritionPipeline::new(
            PreprocessingConfig {
                max_dimension: 64,
                ..Default::default()
            },
            corrector(),
            Some(cloud as Arc<dyn OcrEngine>),
            Some(local as Arc<dyn OcrEngine>),
            true,
        )
    }

    #[test]
    fn test_analyze_text_full_label() {
        let text = "Servings per container: 4\nSodium 150mg\nProtein 3g\nTotal Carbohydrate 20g";
        let result = analyze_text(text, &corrector());

        assert_eq!(result.raw_text, text);
        assert_eq!(result.final_extracted.servings.as_deref(), Some("4"));
        assert_eq!(result.protein_per_serving.as_deref(), Some("3 g"));
        assert_eq!(result.sodium_per_serving.as_deref(), Some("150 mg"));
        assert_eq!(result.carbs_per_serving.as_deref(), Some("20 g"));
        assert_eq!(result.protein_total.as_deref(), Some("12 g"));
        assert_eq!(result.sodium_total.as_deref(), Some("600 mg"));
        assert_eq!(result.carbs_total.as_deref(), Some("80 g"));
    }

    #[test]
    fn test_corrected_pass_fills_garbled_label_words() {
        let result = analyze_text("Sodum 120mg", &corrector());
        assert_eq!(result.raw_extracted.sodium, None);
        assert_eq!(result.spellchecked_text, "sodium 120mg");
        assert_eq!(result.spellchecked_extracted.sodium.as_deref(), Some("120 mg"));
        assert_eq!(result.final_extracted.sodium.as_deref(), Some("120 mg"));
        assert_eq!(result.sodium_total, None);
    }

    #[test]
    fn test_everyday_words_are_not_turned_into_fields() {
        let cases = [
            ("Protect 2", "protect 2"),
            ("Keep dry. Carry 3 bars", "keep dry carry 3 bars"),
            ("Once opened consume within 3 days", "once opened consume within 3 days"),
            ("Card 5", "card 5"),
        ];
        for (text, corrected) in cases {
            let result = analyze_text(text, &corrector());
            assert_eq!(result.spellchecked_text, corrected);
            assert_eq!(result.final_extracted.matched_count(), 0, "fields in {:?}", text);
        }

        let result = analyze_text("Servings per container: 4 Card 5 Protect 2", &corrector());
        assert_eq!(result.final_extracted.servings.as_deref(), Some("4"));
        assert_eq!(result.final_extracted.protein, None);
        assert_eq!(result.final_extracted.carbohydrates, None);
        assert_eq!(result.protein_total, None);
        assert_eq!(result.carbs_total, None);
    }

    #[test]
    fn test_non_ascii_digits_leave_value_and_total_both_null() {
        let result = analyze_text("Servings: 2\nProtein ٣g\nSodium １２mg", &corrector());
        assert_eq!(result.final_extracted.servings.as_deref(), Some("2"));
        assert_eq!(result.protein_per_serving, None);
        assert_eq!(result.protein_total, None);
        assert_eq!(result.sodium_per_serving, None);
        assert_eq!(result.sodium_total, None);
    }

    #[test]
    fn test_empty_text_yields_null_fields() {
        let result = analyze_text("", &corrector());
        assert_eq!(result, PipelineResult::empty());
    }

    #[test]
    fn test_result_serializes_flat_keys() {
        let json = serde_json::to_value(PipelineResult::empty()).unwrap();
        for key in [
            "raw_text",
            "raw_extracted",
            "spellchecked_text",
            "spellchecked_extracted",
            "final_extracted",
            "protein_per_serving",
            "sodium_per_serving",
            "carbs_per_serving",
            "protein_total",
            "sodium_total",
            "carbs_total",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }

    #[tokio::test]
    async fn test_corrupt_image_skips_ocr() {
        let cloud = FixedTextEngine::new("Protein 5g");
        let local = FixedTextEngine::new("Protein 6g");
        let pipeline = pipeline_with(cloud.clone(), local.clone());

        let result = pipeline.process_image(b"not an image at all", true).await;
        assert_eq!(result, PipelineResult::empty());
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 0);
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cloud_text_is_used_when_present() {
        let cloud = FixedTextEngine::new("Protein 5g");
        let local = FixedTextEngine::new("Protein 6g");
        let pipeline = pipeline_with(cloud.clone(), local.clone());

        let result = pipeline.process_image(&small_png(), true).await;
        assert_eq!(result.protein_per_serving.as_deref(), Some("5 g"));
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_cloud_text_falls_back_to_local() {
        let cloud = FixedTextEngine::new("   ");
        let local = FixedTextEngine::new("Protein 6g");
        let pipeline = pipeline_with(cloud.clone(), local.clone());

        let result = pipeline.process_image(&small_png(), true).await;
        assert_eq!(result.protein_per_serving.as_deref(), Some("6 g"));
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 1);
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_mode_never_calls_cloud() {
        let cloud = FixedTextEngine::new("Protein 5g");
        let local = FixedTextEngine::new("Protein 6g");
        let pipeline = pipeline_with(cloud.clone(), local.clone());

        let result = pipeline.process_image(&small_png(), false).await;
        assert_eq!(result.protein_per_serving.as_deref(), Some("6 g"));
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_detect_text_uses_raw_upload() {
        let cloud = FixedTextEngine::new("Nutrition Facts");
        let local = FixedTextEngine::new("");
        let pipeline = pipeline_with(cloud, local);

        let text = pipeline.detect_text(b"any bytes", true).await.unwrap();
        assert_eq!(text, "Nutrition Facts");
    }
}
