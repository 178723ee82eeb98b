//! # Tesseract Instance Manager Module
//!
//! Caches initialized Tesseract instances keyed by language and model so the
//! local fallback engine does not pay the initialization cost on every image.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::{ModelType, OcrConfig};

/// Shared handle to one initialized Tesseract instance
pub type SharedTesseract = Arc<Mutex<LepTess>>;

/// Thread-safe cache of Tesseract instances
///
/// Instances are created on first request for a language/model combination and
/// reused afterwards. Each instance is guarded by its own mutex, so images that
/// share a configuration are recognized one at a time on that instance.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, SharedTesseract>>,
}

impl OcrInstanceManager {
    /// Create an empty instance cache
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn instance_key(config: &OcrConfig) -> String {
        format!("{}:{}", config.languages, config.model_type.tessdata_dir())
    }

    /// Get or create a Tesseract instance for the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if Tesseract cannot be initialized (missing language data,
    /// invalid page segmentation value).
    pub fn get_instance(&self, config: &OcrConfig) -> anyhow::Result<SharedTesseract> {
        let key = Self::instance_key(config);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            languages = %config.languages,
            model = %config.model_type.tessdata_dir(),
            "Creating new Tesseract instance"
        );

        let tessdata_path = Self::get_tessdata_path(config.model_type);

        let mut tess = LepTess::new(tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        let instance = Arc::new(Mutex::new(tess));

        // A concurrent caller may have raced us here; keep whichever landed first.
        let mut instances = self.instances.lock();
        let stored = instances.entry(key).or_insert_with(|| Arc::clone(&instance));
        Ok(Arc::clone(stored))
    }

    /// Get the tessdata path for the specified model type
    ///
    /// Falls back to Tesseract's compiled-in default when no model-specific
    /// directory is installed.
    fn get_tessdata_path(model_type: ModelType) -> Option<String> {
        if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
            return Some(prefix);
        }

        let possible_paths: &[&str] = match model_type {
            ModelType::Fast => &[
                "/usr/share/tesseract-ocr/5/tessdata_fast",
                "/usr/share/tesseract-ocr/4.00/tessdata_fast",
                "/usr/share/tessdata_fast",
                "/usr/local/share/tessdata_fast",
            ],
            ModelType::Best => &[
                "/usr/share/tesseract-ocr/5/tessdata_best",
                "/usr/share/tesseract-ocr/4.00/tessdata_best",
                "/usr/share/tessdata_best",
                "/usr/local/share/tessdata_best",
            ],
        };

        for path in possible_paths {
            if std::path::Path::new(path).exists() {
                info!("Using tessdata path: {}", path);
                return Some((*path).to_string());
            }
        }

        info!(
            "No specific tessdata path found for model type {:?}, using default",
            model_type
        );
        None
    }

    /// Number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
