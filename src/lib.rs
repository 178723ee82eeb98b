//! # Nutrition OCR
//!
//! Extracts nutrition facts (servings, sodium, protein, carbohydrates) from
//! photographs of product labels. Images are preprocessed, read by a cloud OCR
//! service or a local Tesseract engine, matched against field patterns, spell
//! corrected and matched again, and finally scaled to whole-package totals.

pub mod batch;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod instance_manager;
pub mod nutrition;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod pipeline;
pub mod preprocessing;
pub mod spell_correction;
pub mod text_processing;
pub mod vision;

// Re-export types for easier access
pub use batch::{BatchResult, ImageUpload};
pub use nutrition::{ExtractionResult, Field};
pub use pipeline::{NutritionPipeline, PipelineResult};
