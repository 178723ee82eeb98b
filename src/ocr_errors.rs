//! # OCR Error Types Module
//!
//! Error kinds produced by OCR engines and image preparation. None of these abort a
//! batch: the pipeline logs them and continues with empty text.

/// Custom error types for OCR operations
#[derive(Debug, Clone, PartialEq)]
pub enum OcrError {
    /// The input bytes could not be decoded as an image
    InvalidImage(String),
    /// The OCR service reported an error or the call failed
    Service(String),
    /// OCR engine initialization errors
    Initialization(String),
    /// Text extraction errors inside a local engine
    Extraction(String),
    /// The call exceeded its time budget
    Timeout(String),
    /// The engine is temporarily refusing calls (circuit open)
    Unavailable(String),
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::InvalidImage(msg) => write!(f, "[INVALID_IMAGE] Image could not be decoded: {}", msg),
            OcrError::Service(msg) => write!(f, "[OCR_SERVICE] OCR service call failed: {}", msg),
            OcrError::Initialization(msg) => write!(f, "[OCR_INIT] OCR engine initialization failed: {}", msg),
            OcrError::Extraction(msg) => write!(f, "[OCR_EXTRACT] Text extraction from image failed: {}", msg),
            OcrError::Timeout(msg) => write!(f, "[OCR_TIMEOUT] OCR processing timed out: {}", msg),
            OcrError::Unavailable(msg) => write!(f, "[OCR_UNAVAILABLE] OCR engine temporarily unavailable: {}", msg),
        }
    }
}

impl std::error::Error for OcrError {}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::Extraction(err.to_string())
    }
}

impl From<reqwest::Error> for OcrError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OcrError::Timeout(err.to_string())
        } else {
            OcrError::Service(err.to_string())
        }
    }
}
