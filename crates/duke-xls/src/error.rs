//! XLS engine error types

use duke_xls_records::RecordError;
use thiserror::Error;

/// Result type for workbook and sheet operations
pub type XlsResult<T> = std::result::Result<T, XlsError>;

/// Errors raised while building, mutating or writing a record stream
#[derive(Debug, Error)]
pub enum XlsError {
    /// IO error (also covers CFB errors which use std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The record stream is structurally broken
    #[error("Invalid XLS format: {0}")]
    InvalidFormat(String),

    /// The caller asked for something the stream cannot represent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unsupported version or sub-stream type
    #[error("Unsupported XLS version: {0}")]
    UnsupportedVersion(String),

    /// Record codec error
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

impl XlsError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        XlsError::InvalidFormat(msg.into())
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        XlsError::InvalidArgument(msg.into())
    }
}
