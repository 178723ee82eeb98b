//! # Batch Processing
//!
//! Runs the pipeline over several uploads with a bounded number of images in
//! flight, keeps results in upload order, and sums the per-image totals.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::nutrition::{format_quantity, parse_leading_number, Field};
use crate::observability;
use crate::pipeline::{NutritionPipeline, PipelineResult};

/// Images processed concurrently when nothing else is configured
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Batch execution settings
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Maximum number of images processed at the same time
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=64).contains(&self.max_concurrency) {
            return Err(AppError::Config(format!(
                "max_concurrency must be between 1 and 64, got {}",
                self.max_concurrency
            )));
        }
        Ok(())
    }
}

/// One uploaded image
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// A pipeline result tagged with its upload's file name.
///
/// Serializes flat: `{"filename": .., "raw_text": .., ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub filename: String,
    #[serde(flatten)]
    pub result: PipelineResult,
}

/// Sums of the per-image totals; `None` when no image contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedTotals {
    pub protein_total: Option<String>,
    pub sodium_total: Option<String>,
    pub carbs_total: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub items: Vec<BatchItem>,
    pub combined: CombinedTotals,
}

/// Sum of one total across results; an overflowing sum is absent, like an
/// overflowing per-image total.
fn sum_field<'a>(results: impl Iterator<Item = &'a PipelineResult>, field: Field) -> Option<String> {
    let mut sum = 0u64;
    let mut contributors = 0usize;
    for result in results {
        if let Some(value) = parse_leading_number(result.total(field)) {
            let Some(next) = sum.checked_add(value) else {
                warn!(field = field.name(), "Combined total overflowed, leaving it empty");
                return None;
            };
            sum = next;
            contributors += 1;
        }
    }
    (contributors > 0).then(|| format_quantity(&sum.to_string(), field.unit()))
}

/// Sums each total across results, skipping images without that total.
///
/// ```
/// use nutrition_ocr::batch::aggregate_totals;
/// use nutrition_ocr::pipeline::PipelineResult;
///
/// let a = PipelineResult { sodium_total: Some("100 mg".into()), ..Default::default() };
/// let b = PipelineResult::empty();
/// let combined = aggregate_totals(&[a, b]);
/// assert_eq!(combined.sodium_total.as_deref(), Some("100 mg"));
/// assert_eq!(combined.protein_total, None);
/// ```
pub fn aggregate_totals<'a, I>(results: I) -> CombinedTotals
where
    I: IntoIterator<Item = &'a PipelineResult>,
    I::IntoIter: Clone,
{
    let results = results.into_iter();
    CombinedTotals {
        protein_total: sum_field(results.clone(), Field::Protein),
        sodium_total: sum_field(results.clone(), Field::Sodium),
        carbs_total: sum_field(results, Field::Carbohydrates),
    }
}

/// Processes a batch with the default concurrency limit.
pub async fn process_batch(
    pipeline: Arc<NutritionPipeline>,
    uploads: Vec<ImageUpload>,
    use_cloud: bool,
) -> AppResult<BatchResult> {
    process_batch_with_config(pipeline, uploads, use_cloud, &BatchConfig::default()).await
}

/// Processes a batch, at most `config.max_concurrency` images at a time.
///
/// # Errors
///
/// `AppError::NoFiles` for an empty upload list. Per-image failures never
/// abort the batch: they show up as all-null items.
pub async fn process_batch_with_config(
    pipeline: Arc<NutritionPipeline>,
    uploads: Vec<ImageUpload>,
    use_cloud: bool,
    config: &BatchConfig,
) -> AppResult<BatchResult> {
    if uploads.is_empty() {
        return Err(AppError::NoFiles);
    }

    let start_time = Instant::now();
    let batch_size = uploads.len();
    let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    info!(
        images = batch_size,
        max_concurrency = config.max_concurrency,
        use_cloud,
        "Starting batch"
    );

    let mut handles = Vec::with_capacity(batch_size);
    for upload in uploads {
        let pipeline = Arc::clone(&pipeline);
        let permits = Arc::clone(&permits);
        let filename = upload.filename.clone();
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            Ok::<_, AppError>(pipeline.process_image(&upload.bytes, use_cloud).await)
        });
        handles.push((filename, handle));
    }

    let mut items = Vec::with_capacity(batch_size);
    for (filename, handle) in handles {
        let result = match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                error!(filename = %filename, error = %err, "Image task could not run");
                PipelineResult::empty()
            }
            Err(join_error) => {
                error!(filename = %filename, error = %join_error, "Image task failed");
                PipelineResult::empty()
            }
        };
        items.push(BatchItem { filename, result });
    }

    let combined = aggregate_totals(items.iter().map(|item| &item.result));

    observability::record_batch_metrics(batch_size, start_time.elapsed());
    info!(
        images = batch_size,
        "Batch completed in {}ms",
        start_time.elapsed().as_millis()
    );

    Ok(BatchResult { items, combined })
}
