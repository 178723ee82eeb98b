//! # Observability Configuration
//!
//! Environment-driven settings for logging, metrics export and trace export.

use std::env;

use crate::config::parse_env;
use crate::errors::{AppError, AppResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// OTLP endpoint for trace export
    pub otlp_endpoint: Option<String>,
    /// Prometheus metrics endpoint port
    pub metrics_port: u16,
    /// Log level for this crate
    pub log_level: String,
    /// Explicit log format; `None` picks pretty in development and JSON elsewhere
    pub log_format: Option<LogFormat>,
    /// Whether to enable trace sampling
    pub enable_trace_sampling: bool,
    /// Trace sampling ratio (0.0-1.0)
    pub trace_sampling_ratio: f64,
    /// Whether to serve `/metrics` and the health endpoints
    pub enable_metrics_export: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            otlp_endpoint: None,
            metrics_port: 9090,
            log_level: "info".to_string(),
            log_format: None,
            enable_trace_sampling: false,
            trace_sampling_ratio: 1.0,
            enable_metrics_export: false,
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            metrics_port: parse_env("METRICS_PORT", defaults.metrics_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env::var("LOG_FORMAT")
                .ok()
                .and_then(|v| LogFormat::from_env_value(&v)),
            enable_trace_sampling: parse_env(
                "ENABLE_TRACE_SAMPLING",
                defaults.enable_trace_sampling,
            )?,
            trace_sampling_ratio: parse_env("TRACE_SAMPLING_RATIO", defaults.trace_sampling_ratio)?,
            enable_metrics_export: parse_env(
                "ENABLE_METRICS_EXPORT",
                defaults.enable_metrics_export,
            )?,
        })
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Format actually used for log output
    pub fn effective_log_format(&self) -> LogFormat {
        self.log_format.unwrap_or(if self.is_development() {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "Invalid OTLP endpoint format: {}",
                    endpoint
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.trace_sampling_ratio) {
            return Err(AppError::Config(format!(
                "Invalid trace sampling ratio: {}",
                self.trace_sampling_ratio
            )));
        }

        if self.metrics_port == 0 {
            return Err(AppError::Config(format!(
                "Invalid metrics port: {}",
                self.metrics_port
            )));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
            return Err(AppError::Config(format!(
                "Invalid log level: {}",
                self.log_level
            )));
        }

        Ok(())
    }
}
