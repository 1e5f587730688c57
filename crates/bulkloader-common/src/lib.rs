//! Bulkloader Common Library
//!
//! Shared types, utilities, and error handling for the bulkloader workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Unknown-code error raised by the code tables
//! - **Logging**: Console/file tracing setup driven by environment
//! - **Types**: Exit codes, lock settings, and temp-table status codes
//! - **Variables**: `${name}` substitution table shared across processes
//!
//! # Example
//!
//! ```no_run
//! use bulkloader_common::types::{LockType, LockedOperation};
//!
//! let lock = LockType::find("1");
//! let operation = LockedOperation::find("3");
//! assert_eq!(lock, Some(LockType::Table));
//! assert_eq!(operation, Some(LockedOperation::Error));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;
pub mod variables;

// Re-export commonly used types
pub use error::BulkloaderError;
pub use variables::{VariableError, VariableTable};
