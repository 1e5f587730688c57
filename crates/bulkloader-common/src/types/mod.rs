//! Code-backed enums shared across the bulkloader
//!
//! Every enum here is persisted or exchanged as a short code (configuration
//! values, status columns, process exit codes). Each one owns an immutable
//! lookup table built once from its variant list.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::LazyLock;

use crate::error::BulkloaderError;

// ============================================================================
// Lookup Table
// ============================================================================

/// Immutable code -> variant table
#[derive(Debug)]
pub struct CodeTable<K, T> {
    entries: HashMap<K, T>,
}

impl<K: Eq + Hash, T: Copy> CodeTable<K, T> {
    pub fn new(pairs: impl IntoIterator<Item = (K, T)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Process Exit Codes
// ============================================================================

/// Exit status of an importer/exporter process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCode {
    Success,
    Error,
    Warning,
    Retryable,
}

static EXIT_CODES: LazyLock<CodeTable<i32, ExitCode>> =
    LazyLock::new(|| CodeTable::new(ExitCode::ALL.iter().map(|c| (c.code(), *c))));

impl ExitCode {
    pub const ALL: [ExitCode; 4] = [
        ExitCode::Success,
        ExitCode::Error,
        ExitCode::Warning,
        ExitCode::Retryable,
    ];

    pub fn code(&self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Error => 1,
            ExitCode::Warning => 2,
            ExitCode::Retryable => 3,
        }
    }

    pub fn find(code: i32) -> Option<Self> {
        EXIT_CODES.get(&code)
    }

    /// Whether the step that produced this code has finished without a fatal error
    pub fn is_completed(&self) -> bool {
        matches!(self, ExitCode::Success | ExitCode::Warning)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "SUCCESS({})", self.code()),
            ExitCode::Error => write!(f, "ERROR({})", self.code()),
            ExitCode::Warning => write!(f, "WARNING({})", self.code()),
            ExitCode::Retryable => write!(f, "RETRYABLE({})", self.code()),
        }
    }
}

// ============================================================================
// Import Lock Settings
// ============================================================================

/// How an import acquires database-level locks on its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    /// Lock the whole table
    Table,
    /// Lock only the rows selected by the import
    Record,
    /// Take no lock
    None,
}

static LOCK_TYPES: LazyLock<CodeTable<&'static str, LockType>> =
    LazyLock::new(|| CodeTable::new(LockType::ALL.iter().map(|t| (t.code(), *t))));

impl LockType {
    pub const ALL: [LockType; 3] = [LockType::Table, LockType::Record, LockType::None];

    pub fn code(&self) -> &'static str {
        match self {
            LockType::Table => "1",
            LockType::Record => "2",
            LockType::None => "3",
        }
    }

    pub fn find(code: &str) -> Option<Self> {
        LOCK_TYPES.get(code)
    }
}

impl std::str::FromStr for LockType {
    type Err = BulkloaderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::find(s).ok_or_else(|| BulkloaderError::UnknownCode {
            kind: "lock type",
            code: s.to_string(),
        })
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockType::Table => write!(f, "TABLE"),
            LockType::Record => write!(f, "RECORD"),
            LockType::None => write!(f, "NONE"),
        }
    }
}

/// What an import does with rows or tables already locked by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockedOperation {
    /// Skip locked rows
    Off,
    /// Process rows regardless of lock state
    Force,
    /// Fail on a lock conflict
    Error,
}

static LOCKED_OPERATIONS: LazyLock<CodeTable<&'static str, LockedOperation>> =
    LazyLock::new(|| CodeTable::new(LockedOperation::ALL.iter().map(|o| (o.code(), *o))));

impl LockedOperation {
    pub const ALL: [LockedOperation; 3] = [
        LockedOperation::Off,
        LockedOperation::Force,
        LockedOperation::Error,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            LockedOperation::Off => "1",
            LockedOperation::Force => "2",
            LockedOperation::Error => "3",
        }
    }

    pub fn find(code: &str) -> Option<Self> {
        LOCKED_OPERATIONS.get(code)
    }
}

impl std::str::FromStr for LockedOperation {
    type Err = BulkloaderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::find(s).ok_or_else(|| BulkloaderError::UnknownCode {
            kind: "locked operation",
            code: s.to_string(),
        })
    }
}

impl std::fmt::Display for LockedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockedOperation::Off => write!(f, "OFF"),
            LockedOperation::Force => write!(f, "FORCE"),
            LockedOperation::Error => write!(f, "ERROR"),
        }
    }
}

/// Whether a lock type and locked operation may be configured together
pub fn is_consistent_lock_pair(lock_type: LockType, operation: LockedOperation) -> bool {
    !matches!(
        (lock_type, operation),
        (LockType::Table, LockedOperation::Off)
            | (LockType::Table, LockedOperation::Force)
            | (LockType::Record, LockedOperation::Force)
            | (LockType::None, LockedOperation::Off)
    )
}

// ============================================================================
// Export Temp Table Status
// ============================================================================

/// Progress of an export staging table, ordered from first to last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TempTableStatus {
    /// TSV loaded into the temp table
    LoadExit,
    /// About to copy temp -> export table
    BeforeCopy,
    /// Copy finished
    CopyExit,
}

static TEMP_TABLE_STATUSES: LazyLock<CodeTable<&'static str, TempTableStatus>> =
    LazyLock::new(|| CodeTable::new(TempTableStatus::ALL.iter().map(|s| (s.code(), *s))));

impl TempTableStatus {
    pub const ALL: [TempTableStatus; 3] = [
        TempTableStatus::LoadExit,
        TempTableStatus::BeforeCopy,
        TempTableStatus::CopyExit,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            TempTableStatus::LoadExit => "1",
            TempTableStatus::BeforeCopy => "2",
            TempTableStatus::CopyExit => "3",
        }
    }

    pub fn find(code: &str) -> Option<Self> {
        TEMP_TABLE_STATUSES.get(code)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TempTableStatus::CopyExit)
    }
}

impl std::str::FromStr for TempTableStatus {
    type Err = BulkloaderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::find(s).ok_or_else(|| BulkloaderError::UnknownCode {
            kind: "temp table status",
            code: s.to_string(),
        })
    }
}

impl std::fmt::Display for TempTableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TempTableStatus::LoadExit => write!(f, "LOAD_EXIT"),
            TempTableStatus::BeforeCopy => write!(f, "BEFORE_COPY"),
            TempTableStatus::CopyExit => write!(f, "COPY_EXIT"),
        }
    }
}
