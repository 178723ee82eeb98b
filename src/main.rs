use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nutrition_ocr::batch::{self, ImageUpload};
use nutrition_ocr::config::AppConfig;
use nutrition_ocr::errors::{error_logging, AppError};
use nutrition_ocr::observability;
use nutrition_ocr::pipeline::NutritionPipeline;
use nutrition_ocr::preprocessing::is_image_content;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "nutrition-ocr")]
#[command(about = "Read nutrition fields from food label photos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Extract nutrition fields from every image and print combined totals
    Extract(ImageArgs),
    /// Print the full per-image analysis (raw, corrected and final fields)
    Inspect(ImageArgs),
    /// Print the text the OCR engine detects, without field extraction
    Detect(ImageArgs),
}

impl Command {
    fn images(&self) -> &ImageArgs {
        match self {
            Command::Extract(args) | Command::Inspect(args) | Command::Detect(args) => args,
        }
    }
}

#[derive(Args, Debug, PartialEq)]
struct ImageArgs {
    /// Use the local Tesseract engine instead of the cloud service
    #[arg(long)]
    local: bool,

    /// Label images to read
    files: Vec<PathBuf>,
}

/// Read every file up front and reject anything that is not an image
async fn load_uploads(paths: &[PathBuf], max_file_size: u64) -> Result<Vec<ImageUpload>> {
    if paths.is_empty() {
        return Err(AppError::NoFiles.into());
    }

    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        let display = path.display().to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| {
                error_logging::log_filesystem_error(&e, "read_upload", Some(display.as_str()), None);
                e
            })
            .with_context(|| format!("Failed to read {}", display))?;

        if bytes.len() as u64 > max_file_size {
            return Err(AppError::Validation(format!(
                "{} is {} bytes, larger than the {} byte limit",
                display,
                bytes.len(),
                max_file_size
            ))
            .into());
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or(display);

        if !is_image_content(&bytes) {
            return Err(AppError::UnsupportedFileType(filename).into());
        }
        uploads.push(ImageUpload::new(filename, bytes));
    }
    Ok(uploads)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let images = cli.command.images();
    let use_cloud = !images.local;

    let config = AppConfig::from_env()
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    let guard = observability::init_observability_with_config(&config.observability).await?;
    info!("{}", config.summary());

    let uploads = load_uploads(&images.files, config.ocr.max_file_size).await?;
    let pipeline = Arc::new(
        NutritionPipeline::from_config(&config)
            .map_err(|e| anyhow::anyhow!("Failed to build pipeline: {}", e))?,
    );

    match &cli.command {
        Command::Extract(_) => {
            let result =
                batch::process_batch_with_config(pipeline, uploads, use_cloud, &config.batch)
                    .await?;
            print_json(&result)?;
        }
        Command::Inspect(_) => {
            for upload in &uploads {
                let result = pipeline.process_image(&upload.bytes, use_cloud).await;
                print_json(&serde_json::json!({
                    "filename": upload.filename,
                    "analysis": result,
                }))?;
            }
        }
        Command::Detect(_) => {
            for upload in &uploads {
                let body = match pipeline.detect_text(&upload.bytes, use_cloud).await {
                    Ok(text) => serde_json::json!({ "detected_text": text }),
                    Err(e) => serde_json::json!({ "error": e.to_string() }),
                };
                print_json(&body)?;
            }
        }
    }

    guard.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("nutrition-ocr").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_defaults_to_cloud() {
        let cli = parse(&["extract", "a.png", "b.jpg"]).unwrap();
        let images = cli.command.images();
        assert!(matches!(cli.command, Command::Extract(_)));
        assert!(!images.local);
        assert_eq!(images.files, vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")]);
    }

    #[test]
    fn test_cli_local_flag_anywhere() {
        let cli = parse(&["detect", "a.png", "--local"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Detect(ImageArgs {
                local: true,
                files: vec![PathBuf::from("a.png")],
            })
        );

        let cli = parse(&["inspect", "--local", "a.png"]).unwrap();
        assert!(cli.command.images().local);
    }

    #[test]
    fn test_cli_rejects_unknown_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["scan", "a.png"]).is_err());
        assert!(parse(&["extract", "--fast", "a.png"]).is_err());
    }

    #[tokio::test]
    async fn test_load_uploads_without_files() {
        let err = load_uploads(&[], 1024).await.unwrap_err();
        assert_eq!(err.downcast_ref::<AppError>(), Some(&AppError::NoFiles));
    }

    #[tokio::test]
    async fn test_load_uploads_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"Sodium 120mg").unwrap();

        let err = load_uploads(&[path], 1024)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<AppError>(),
            Some(&AppError::UnsupportedFileType("notes.txt".to_string()))
        );
    }

    #[tokio::test]
    async fn test_load_uploads_enforces_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.png");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let err = load_uploads(&[path], 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::Validation(_))
        ));
    }
}
