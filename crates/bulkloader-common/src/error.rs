//! Error types for the bulkloader

use thiserror::Error;

/// Errors raised by the shared code tables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BulkloaderError {
    #[error("Unknown code for {kind}: {code}")]
    UnknownCode { kind: &'static str, code: String },
}
