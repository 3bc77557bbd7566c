//! Error types for the structure-tree extractor.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur while recovering a document structure tree.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The document path does not exist.
    #[error("Document not found at '{0}'")]
    DocumentNotFound(PathBuf),

    /// The input is not a PDF file path or PDF byte stream.
    #[error("Unsupported input: '{0}' is not a PDF")]
    UnsupportedInput(PathBuf),

    /// PDF decoding failed.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// The tree file does not exist.
    #[error("Tree file not found at '{0}'")]
    TreeNotFound(PathBuf),

    /// LLM API error, including retry exhaustion.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Model output was cut off where no continuation strategy exists.
    #[error("Model output truncated: {0}")]
    Truncated(String),

    /// Every extraction strategy failed for a page range.
    #[error("Structure extraction failed: {0}")]
    ExtractionFailed(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExtractError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        ExtractError::LlmParse(err.to_string())
    }
}

impl From<lopdf::Error> for ExtractError {
    fn from(err: lopdf::Error) -> Self {
        ExtractError::Pdf(err.to_string())
    }
}
