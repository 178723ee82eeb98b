//! # OCR Configuration Module
//!
//! This module defines configuration structures for the OCR engines:
//! the cloud text-detection service, the local Tesseract fallback, and the
//! timeout and circuit breaker settings that guard both.

use std::env;

use crate::config::parse_env;
use crate::errors::{AppError, AppResult};

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit for image files

/// Timeout and circuit breaker settings for OCR calls.
///
/// There is deliberately no retry count here: a failed primary call is
/// answered by the local fallback (when enabled), never by repeating it.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Timeout for a single OCR call in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 30,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.operation_timeout_secs == 0 {
            return Err(AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_secs > 300 {
            return Err(AppError::Config(
                "operation_timeout_secs cannot be greater than 300 seconds".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(AppError::Config(
                "circuit_breaker_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_reset_secs == 0 {
            return Err(AppError::Config(
                "circuit_breaker_reset_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    #[default]
    Auto,
    /// Assume a single column of text
    SingleColumn,
    /// Assume a single uniform block of text
    SingleBlock,
    /// Find as much text as possible in no particular order
    SparseText,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse the numeric Tesseract value used in environment variables
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim() {
            "3" => Some(PageSegMode::Auto),
            "4" => Some(PageSegMode::SingleColumn),
            "6" => Some(PageSegMode::SingleBlock),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }
}

/// Settings for the cloud text-detection service
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// REST endpoint for `images:annotate`
    pub endpoint: String,
    /// API key appended as the `key` query parameter
    pub api_key: Option<String>,
    /// HTTP client timeout in seconds
    pub http_timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            api_key: None,
            http_timeout_secs: 30,
        }
    }
}

impl VisionConfig {
    /// Validate cloud service settings
    pub fn validate(&self) -> AppResult<()> {
        if !self.endpoint.starts_with("https://") && !self.endpoint.starts_with("http://") {
            return Err(AppError::Config(format!(
                "vision endpoint '{}' must be an http(s) URL",
                self.endpoint
            )));
        }
        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                return Err(AppError::Config(
                    "GOOGLE_VISION_API_KEY cannot be empty when set".to_string(),
                ));
            }
        }
        if self.http_timeout_secs == 0 {
            return Err(AppError::Config("HTTP timeout cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes for Tesseract (e.g., "eng", "eng+fra")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Default page segmentation mode for Tesseract
    pub psm_mode: PageSegMode,
    /// Maximum allowed upload size in bytes
    pub max_file_size: u64,
    /// Run Tesseract when the cloud service returns no text
    pub enable_local_fallback: bool,
    /// Timeout and circuit breaker configuration
    pub recovery: RecoveryConfig,
    /// Cloud service configuration
    pub vision: VisionConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
            psm_mode: PageSegMode::default(),
            max_file_size: MAX_FILE_SIZE,
            enable_local_fallback: true,
            recovery: RecoveryConfig::default(),
            vision: VisionConfig::default(),
        }
    }
}

impl OcrConfig {
    /// Load OCR settings from environment variables, falling back to defaults
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            languages: env::var("OCR_LANGUAGES").unwrap_or(defaults.languages),
            model_type: match env::var("OCR_MODEL_TYPE").as_deref() {
                Ok("best") => ModelType::Best,
                _ => ModelType::Fast,
            },
            psm_mode: env::var("OCR_PSM_MODE")
                .ok()
                .and_then(|v| PageSegMode::from_env_value(&v))
                .unwrap_or(defaults.psm_mode),
            max_file_size: parse_env("OCR_MAX_FILE_SIZE", defaults.max_file_size)?,
            enable_local_fallback: parse_env("OCR_LOCAL_FALLBACK", defaults.enable_local_fallback)?,
            recovery: RecoveryConfig {
                operation_timeout_secs: parse_env(
                    "OCR_TIMEOUT_SECS",
                    defaults.recovery.operation_timeout_secs,
                )?,
                ..defaults.recovery
            },
            vision: VisionConfig {
                endpoint: env::var("GOOGLE_VISION_ENDPOINT").unwrap_or(defaults.vision.endpoint),
                api_key: env::var("GOOGLE_VISION_API_KEY").ok(),
                http_timeout_secs: parse_env(
                    "HTTP_CLIENT_TIMEOUT_SECS",
                    defaults.vision.http_timeout_secs,
                )?,
            },
        })
    }

    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(AppError::Config("languages cannot be empty".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        self.recovery.validate()?;
        self.vision.validate()?;

        Ok(())
    }
}
