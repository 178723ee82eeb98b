//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable level and format
//! - Metrics collection and Prometheus export
//! - Optional OpenTelemetry trace export over OTLP
//! - Health check endpoints next to `/metrics`
//! - Span and metric helpers used by the pipeline

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use leptess::LepTess;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use crate::nutrition::{Field, FieldSource};
use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Keeps exporters alive for the lifetime of the process.
///
/// Call [`shutdown`](Self::shutdown) before exiting so buffered spans are flushed.
#[derive(Default)]
pub struct ObservabilityGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl ObservabilityGuard {
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "OpenTelemetry shutdown failed");
            }
        }
    }
}

/// Initialize the complete observability stack with custom configuration
pub async fn init_observability_with_config(
    config: &ObservabilityConfig,
) -> Result<ObservabilityGuard> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing_with_config(config)?;

    if config.enable_metrics_export {
        let metrics_handle = init_metrics()?;
        start_metrics_server(metrics_handle, config.metrics_port).await?;
    } else {
        tracing::debug!("Metrics export disabled");
    }

    let tracer_provider = init_opentelemetry_tracing_with_config(config)?;

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        metrics_export = config.enable_metrics_export,
        "Observability stack initialized successfully"
    );
    Ok(ObservabilityGuard { tracer_provider })
}

/// Initialize structured logging with tracing and configuration
fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("nutrition_ocr={}", config.log_level).parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    // Logs go to stderr so stdout stays clean for JSON results
    match config.effective_log_format() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?,
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install the Prometheus recorder
fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Initialize OpenTelemetry distributed tracing when an OTLP endpoint is configured
fn init_opentelemetry_tracing_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<SdkTracerProvider>> {
    let Some(endpoint) = &config.otlp_endpoint else {
        tracing::info!("OpenTelemetry tracing disabled (no OTLP endpoint configured)");
        return Ok(None);
    };

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()?;

    let mut builder = SdkTracerProvider::builder().with_batch_exporter(otlp_exporter);
    if config.enable_trace_sampling {
        builder = builder.with_sampler(Sampler::TraceIdRatioBased(config.trace_sampling_ratio));
    }
    let tracer_provider = builder.build();

    global::set_tracer_provider(tracer_provider.clone());

    tracing::info!(
        otlp_endpoint = %endpoint,
        trace_sampling_enabled = %config.enable_trace_sampling,
        trace_sampling_ratio = %config.trace_sampling_ratio,
        "OpenTelemetry tracing initialized with OTLP export"
    );
    Ok(Some(tracer_provider))
}

async fn start_metrics_server(metrics_handle: PrometheusHandle, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;
    tracing::info!("Metrics server listening on {}", addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let metrics_handle = metrics_handle.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                async move {
                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/metrics") => {
                                            let mut response =
                                                hyper::Response::new(metrics_handle.render());
                                            response.headers_mut().insert(
                                                "content-type",
                                                hyper::header::HeaderValue::from_static(
                                                    "text/plain; version=0.0.4; charset=utf-8",
                                                ),
                                            );
                                            Ok::<_, std::convert::Infallible>(response)
                                        }
                                        (&hyper::Method::GET, "/health/live") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        (&hyper::Method::GET, "/health/ready") => {
                                            match check_ocr_health().await {
                                                Ok(()) => Ok(hyper::Response::new("OK".to_string())),
                                                Err(e) => {
                                                    let mut response = hyper::Response::new(
                                                        format!("NOT READY: {}", e),
                                                    );
                                                    *response.status_mut() =
                                                        hyper::StatusCode::SERVICE_UNAVAILABLE;
                                                    Ok(response)
                                                }
                                            }
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            tracing::error!("Error serving connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting connection: {}", e);
                }
            }
        }
    });

    Ok(())
}

/// Check local OCR availability by initializing a throwaway Tesseract instance
pub async fn check_ocr_health() -> Result<()> {
    tokio::task::spawn_blocking(|| {
        LepTess::new(None, "eng")
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("OCR health check failed: {}", e))
    })
    .await
    .context("OCR health check task failed")??;

    tracing::debug!("OCR health check passed");
    Ok(())
}

/// Create a span for one OCR engine call
pub fn ocr_span(engine: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", engine = engine, component = "ocr")
}

/// Create a span for one pipeline run
pub fn pipeline_span(operation: &str, image_bytes: usize) -> tracing::Span {
    tracing::info_span!(
        "pipeline_operation",
        operation = operation,
        image_bytes = image_bytes,
        component = "pipeline"
    )
}

/// Record OCR operation metrics
pub fn record_ocr_metrics(engine: &'static str, success: bool, duration: Duration, image_size: u64) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("ocr_operations_total", "engine" => engine, "result" => result).increment(1);
    metrics::histogram!("ocr_duration_seconds", "engine" => engine).record(duration.as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
}

/// Record one pipeline run
pub fn record_pipeline_metrics(outcome: &'static str, duration: Duration, fields_matched: usize) {
    metrics::counter!("pipeline_runs_total", "outcome" => outcome).increment(1);
    metrics::histogram!("pipeline_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("pipeline_fields_matched").record(fields_matched as f64);
}

/// Record which extraction pass supplied a field
pub fn record_field_source(field: Field, source: FieldSource) {
    metrics::counter!(
        "extraction_field_source_total",
        "field" => field.name(),
        "source" => source.as_str()
    )
    .increment(1);
}

/// Record one batch request
pub fn record_batch_metrics(images: usize, duration: Duration) {
    metrics::counter!("batch_requests_total").increment(1);
    metrics::histogram!("batch_size_images").record(images as f64);
    metrics::histogram!("batch_duration_seconds").record(duration.as_secs_f64());
}

/// Update circuit breaker state metric
pub fn update_circuit_breaker_state(is_open: bool) {
    metrics::gauge!("circuit_breaker_state").set(if is_open { 1.0 } else { 0.0 });
}
