//! Per-table import and export settings

use bulkloader_common::types::{LockType, LockedOperation};
use serde::{Deserialize, Serialize};

/// Record type bound to a table through `bean-name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    /// Whether the record type can be stored in the import cache
    pub supports_cache: bool,
}

impl RecordType {
    pub fn new(name: impl Into<String>, supports_cache: bool) -> Self {
        Self {
            name: name.into(),
            supports_cache,
        }
    }
}

/// Import settings for one table
///
/// Fields are optional while the properties are being read. Specs returned
/// by the import loaders have passed validation, so the lock settings,
/// record type and path are always present there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableImportSpec {
    pub table: String,
    pub columns: Vec<String>,
    pub search_condition: Option<String>,
    pub cache_id: Option<String>,
    pub lock_type: Option<LockType>,
    pub locked_operation: Option<LockedOperation>,
    pub record_type: Option<RecordType>,
    /// Destination path template on the distributed filesystem
    pub dfs_path: Option<String>,
}

impl TableImportSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn uses_cache(&self) -> bool {
        self.cache_id.is_some()
    }
}

/// Export settings for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableExportSpec {
    pub table: String,
    pub tsv_columns: Vec<String>,
    pub export_columns: Vec<String>,
    /// A configured error table turns the duplicate check on; the remaining
    /// error fields are then required
    pub error_table: Option<String>,
    pub error_table_columns: Vec<String>,
    pub key_columns: Vec<String>,
    pub error_code_column: Option<String>,
    pub error_code: Option<String>,
    pub record_type: Option<RecordType>,
    /// Source path templates on the distributed filesystem
    pub dfs_paths: Vec<String>,
}

impl TableExportSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn is_duplicate_check(&self) -> bool {
        self.error_table.is_some()
    }
}
