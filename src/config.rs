//! # Unified Application Configuration
//!
//! Collects every configuration section into one object that is loaded from
//! the environment once at startup and validated before any image is processed.

use std::env;

use crate::batch::BatchConfig;
use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::OcrConfig;
use crate::preprocessing::PreprocessingConfig;
use crate::spell_correction::SpellCheckConfig;

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// OCR engines, timeouts and circuit breaker
    pub ocr: OcrConfig,
    /// Image preparation before OCR
    pub preprocessing: PreprocessingConfig,
    /// Spell correction of OCR text
    pub spell: SpellCheckConfig,
    /// Batch concurrency
    pub batch: BatchConfig,
    /// Logging, metrics and tracing
    pub observability: ObservabilityConfig,
}

/// Reads and parses an environment variable; unset falls back to `default`,
/// anything unparseable is a configuration error.
pub(crate) fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", key, value))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Call `dotenvy::dotenv()` beforehand to pick up a `.env` file.
    pub fn from_env() -> AppResult<Self> {
        let defaults = PreprocessingConfig::default();
        let preprocessing = PreprocessingConfig {
            max_dimension: parse_env("PREPROCESS_MAX_DIMENSION", defaults.max_dimension)?,
            threshold_block_size: parse_env(
                "PREPROCESS_THRESHOLD_BLOCK_SIZE",
                defaults.threshold_block_size,
            )?,
            threshold_c: parse_env("PREPROCESS_THRESHOLD_C", defaults.threshold_c)?,
            ..defaults
        };

        Ok(Self {
            ocr: OcrConfig::from_env()?,
            preprocessing,
            spell: SpellCheckConfig::from_env()?,
            batch: BatchConfig {
                max_concurrency: parse_env(
                    "BATCH_MAX_CONCURRENCY",
                    BatchConfig::default().max_concurrency,
                )?,
            },
            observability: ObservabilityConfig::from_env()?,
        })
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.ocr.validate()?;
        self.preprocessing.validate()?;
        self.spell.validate()?;
        self.batch.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: cloud_ocr={}, vision_api_key=[REDACTED], local_fallback={}, ocr_languages={}, max_dimension={}, max_edit_distance={}, batch_concurrency={}, metrics_port={}",
            self.ocr.vision.api_key.is_some(),
            self.ocr.enable_local_fallback,
            self.ocr.languages,
            self.preprocessing.max_dimension,
            self.spell.max_edit_distance,
            self.batch.max_concurrency,
            self.observability.metrics_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.max_concurrency, 4);
        assert_eq!(config.preprocessing.max_dimension, 1000);
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let mut config = AppConfig::default();
        config.preprocessing.threshold_block_size = 10;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.spell.max_edit_distance = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_redacts_api_key() {
        let mut config = AppConfig::default();
        config.ocr.vision.api_key = Some("super-secret".to_string());
        let summary = config.summary();
        assert!(summary.contains("cloud_ocr=true"));
        assert!(!summary.contains("super-secret"));
    }

    #[test]
    fn test_parse_env_defaults_and_errors() {
        assert_eq!(parse_env("NUTRITION_OCR_TEST_UNSET_VAR", 7u32).unwrap(), 7);

        env::set_var("NUTRITION_OCR_TEST_BAD_NUMBER", "seven");
        assert!(parse_env("NUTRITION_OCR_TEST_BAD_NUMBER", 7u32).is_err());
        env::remove_var("NUTRITION_OCR_TEST_BAD_NUMBER");

        env::set_var("NUTRITION_OCR_TEST_PADDED_BOOL", " false ");
        assert!(!parse_env("NUTRITION_OCR_TEST_PADDED_BOOL", true).unwrap());
        env::remove_var("NUTRITION_OCR_TEST_PADDED_BOOL");
    }

    #[test]
    fn test_malformed_section_values_are_rejected() {
        // Each section reads its own variables through the same strict parser
        env::set_var("OCR_MAX_FILE_SIZE", "10MB");
        let err = OcrConfig::from_env().unwrap_err();
        env::remove_var("OCR_MAX_FILE_SIZE");
        assert_eq!(
            err,
            AppError::Config("OCR_MAX_FILE_SIZE has an invalid value '10MB'".to_string())
        );

        env::set_var("SPELL_MAX_EDIT_DISTANCE", "two");
        let result = SpellCheckConfig::from_env();
        env::remove_var("SPELL_MAX_EDIT_DISTANCE");
        assert!(matches!(result, Err(AppError::Config(_))));

        env::set_var("TRACE_SAMPLING_RATIO", "half");
        let result = ObservabilityConfig::from_env();
        env::remove_var("TRACE_SAMPLING_RATIO");
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
