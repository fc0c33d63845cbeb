//! Reader error types
//!
//! Defines all errors that can occur while opening or querying a reader.
//! Range normalisation never fails; only construction and worker failures do.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in readers, decorators and exporters
#[derive(Error, Debug)]
pub enum ReaderError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file content could not be decoded
    #[error("Parse error in {path:?} (line {line}): {message}")]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    /// XML document could not be read or written
    #[error("XML error: {0}")]
    Xml(String),

    /// CSV record could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// No reader is registered for this file type
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(String),

    /// Remote listener could not be set up
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<quick_xml::Error> for ReaderError {
    fn from(err: quick_xml::Error) -> Self {
        ReaderError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ReaderError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ReaderError::Xml(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ReaderError {
    fn from(err: tokio::task::JoinError) -> Self {
        ReaderError::Task(err.to_string())
    }
}

impl ReaderError {
    /// Build a parse error for a line of a backing file
    pub fn parse(path: impl Into<PathBuf>, line: u64, message: impl Into<String>) -> Self {
        ReaderError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Result type alias for reader operations
pub type ReaderResult<T> = Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReaderError::UnsupportedFormat("dlog".to_string());
        assert_eq!(err.to_string(), "Unsupported format: dlog");

        let err = ReaderError::parse("data.csv", 3, "invalid time");
        assert_eq!(
            err.to_string(),
            "Parse error in \"data.csv\" (line 3): invalid time"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let reader_err: ReaderError = io_err.into();
        assert!(matches!(reader_err, ReaderError::Io(_)));
    }
}
