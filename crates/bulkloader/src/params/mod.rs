//! Jobflow import/export parameters
//!
//! Each jobflow ships one properties file per direction and target. Keys are
//! `<table>.<attribute>`; the table list itself comes from
//! `import.target-table` or `export.target-table`.
//!
//! ```text
//! import.target-table=ORDERS
//! ORDERS.target-column=ID,CUSTOMER,AMOUNT
//! ORDERS.lock-type=1
//! ORDERS.locked-operation=3
//! ORDERS.bean-name=com.example.Orders
//! ORDERS.hdfs-import-file=/${user}/${execution_id}/import/ORDERS
//! ```

mod loader;
mod source;
mod spec;
mod validate;

pub use loader::{ParameterLoader, RecoverySpecs};
pub use source::{
    Direction, FileJobflowPropertySource, JobflowPropertySource, RecordTypeRegistry, StaticRecordTypeRegistry,
};
pub use spec::{RecordType, TableExportSpec, TableImportSpec};

use std::path::PathBuf;
use thiserror::Error;

pub const IMPORT_TARGET_TABLE: &str = "import.target-table";
pub const EXPORT_TARGET_TABLE: &str = "export.target-table";

pub const ATTR_TARGET_COLUMN: &str = "target-column";
pub const ATTR_SEARCH_CONDITION: &str = "search-condition";
pub const ATTR_CACHE_ID: &str = "cache-id";
pub const ATTR_LOCK_TYPE: &str = "lock-type";
pub const ATTR_LOCKED_OPERATION: &str = "locked-operation";
pub const ATTR_BEAN_NAME: &str = "bean-name";
pub const ATTR_HDFS_IMPORT_FILE: &str = "hdfs-import-file";

pub const ATTR_ERROR_TABLE: &str = "error-table";
pub const ATTR_TSV_COLUMN: &str = "tsv-column";
pub const ATTR_EXPORT_TABLE_COLUMN: &str = "export-table-column";
pub const ATTR_ERROR_TABLE_COLUMN: &str = "error-table-column";
pub const ATTR_KEY_COLUMN: &str = "key-column";
pub const ATTR_ERROR_COLUMN: &str = "error-column";
pub const ATTR_ERROR_CODE: &str = "error-code";
pub const ATTR_HDFS_EXPORT_FILE: &str = "hdfs-export-file";

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("invalid {attribute} for table {table}: {reason}")]
    Invalid {
        table: String,
        attribute: String,
        reason: String,
    },

    #[error("property key has no table part: {0:?}")]
    MalformedKey(String),

    #[error("unknown record type {name:?} for table {table}")]
    UnknownRecordType { table: String, name: String },

    #[error("failed to read jobflow properties {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParamError {
    pub(crate) fn invalid(table: &str, attribute: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            table: table.to_string(),
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    /// Table the error refers to, when there is one
    pub fn table(&self) -> Option<&str> {
        match self {
            ParamError::Invalid { table, .. } | ParamError::UnknownRecordType { table, .. } => Some(table),
            ParamError::MalformedKey(_) | ParamError::Io { .. } => None,
        }
    }
}

/// Split a comma list, dropping trailing empty items only
pub(crate) fn split_list(value: &str) -> Vec<String> {
    let mut items: Vec<String> = value.split(',').map(str::to_string).collect();
    while items.last().is_some_and(|item| item.is_empty()) {
        items.pop();
    }
    items
}

/// Split `<table>.<attribute>` on the first dot
pub(crate) fn split_key(key: &str) -> Result<(&str, &str), ParamError> {
    key.split_once('.')
        .ok_or_else(|| ParamError::MalformedKey(key.to_string()))
}
