//! Export staging table lifecycle

use bulkloader_common::types::TempTableStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("temp table status of {table} cannot move from {from} to {to}")]
    Backward {
        table: String,
        from: TempTableStatus,
        to: TempTableStatus,
    },

    #[error("temp table status of {table} is already {status}")]
    Unchanged { table: String, status: TempTableStatus },
}

/// One row of `export_temp_table`
///
/// `status` is `None` while the temp table is still being created and loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempTableRecord {
    pub jobflow_sid: i64,
    pub export_table: String,
    pub temp_table: Option<String>,
    pub duplicate_flag_table: Option<String>,
    pub status: Option<TempTableStatus>,
}

impl TempTableRecord {
    pub fn new(jobflow_sid: i64, export_table: impl Into<String>) -> Self {
        Self {
            jobflow_sid,
            export_table: export_table.into(),
            temp_table: None,
            duplicate_flag_table: None,
            status: None,
        }
    }

    /// Validate a move to `next` without applying it
    pub fn check_transition(&self, next: TempTableStatus) -> Result<(), TransitionError> {
        check_transition(&self.export_table, self.status, next)
    }

    /// Move forward to `next`
    pub fn advance(&mut self, next: TempTableStatus) -> Result<(), TransitionError> {
        self.check_transition(next)?;
        self.status = Some(next);
        Ok(())
    }

    pub fn is_copied(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }

    /// Nothing usable was staged yet: no status, or only the load finished
    pub fn needs_rollback(&self) -> bool {
        matches!(self.status, None | Some(TempTableStatus::LoadExit))
    }
}

/// Forward-only rule shared by the in-memory record and the store.
///
/// Skipping ahead is allowed, staying put or moving back is not.
pub fn check_transition(
    table: &str,
    current: Option<TempTableStatus>,
    next: TempTableStatus,
) -> Result<(), TransitionError> {
    match current {
        None => Ok(()),
        Some(current) if current < next => Ok(()),
        Some(current) if current == next => Err(TransitionError::Unchanged {
            table: table.to_string(),
            status: current,
        }),
        Some(current) => Err(TransitionError::Backward {
            table: table.to_string(),
            from: current,
            to: next,
        }),
    }
}
