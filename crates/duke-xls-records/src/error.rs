//! Record-layer error types

use thiserror::Error;

/// Result type for record encoding/decoding
pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Errors raised while reading or writing BIFF8 records
#[derive(Debug, Error)]
pub enum RecordError {
    /// IO error from the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A field could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// The record body is well-formed bytes but violates the record layout
    #[error("Invalid record: {0}")]
    InvalidFormat(String),

    /// The stream ended inside a record
    #[error("Truncated record 0x{sid:04X}: header says {expected} bytes, {actual} available")]
    Truncated {
        sid: u16,
        expected: usize,
        actual: usize,
    },
}
