//! Deciding what an export or recovery run still has to do

use super::state::TempTableRecord;
use bulkloader_common::types::ExitCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStep {
    /// Receive the export files from the cluster
    Receive,
    /// Load the files into temp tables
    Load,
    /// Copy temp tables into the export tables
    Copy,
    /// Release the record and table locks of the jobflow
    ReleaseLock,
}

/// Steps of one export run, judged from the staging rows left by earlier runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    /// Staging rows whose temp and flag tables must be dropped first
    pub discard: Vec<TempTableRecord>,
    pub steps: Vec<ExportStep>,
    /// Tables already copied by an earlier attempt
    pub copied_tables: BTreeSet<String>,
}

impl ExportPlan {
    const FULL_RUN: [ExportStep; 4] = [
        ExportStep::Receive,
        ExportStep::Load,
        ExportStep::Copy,
        ExportStep::ReleaseLock,
    ];

    pub fn judge(records: &[TempTableRecord], export_tables: &[String]) -> Self {
        if export_tables.is_empty() {
            return Self::with_steps(&[ExportStep::ReleaseLock]);
        }
        if records.is_empty() {
            return Self::with_steps(&Self::FULL_RUN);
        }
        if records.iter().any(|r| r.status.is_none()) {
            // an interrupted load leaves half-built temp tables behind
            let mut plan = Self::with_steps(&Self::FULL_RUN);
            plan.discard = records.to_vec();
            return plan;
        }

        let mut plan = Self::with_steps(&[ExportStep::Copy, ExportStep::ReleaseLock]);
        plan.copied_tables = records
            .iter()
            .filter(|r| r.is_copied())
            .map(|r| r.export_table.clone())
            .collect();
        plan
    }

    fn with_steps(steps: &[ExportStep]) -> Self {
        Self {
            discard: Vec::new(),
            steps: steps.to_vec(),
            copied_tables: BTreeSet::new(),
        }
    }

    pub fn runs(&self, step: ExportStep) -> bool {
        self.steps.contains(&step)
    }

    /// Whether the copy step still has to process `table`
    pub fn needs_copy(&self, table: &str) -> bool {
        self.runs(ExportStep::Copy) && !self.copied_tables.contains(table)
    }
}

/// What recovery does with an abandoned jobflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryDecision {
    /// Drop staged data and release locks
    RollBack,
    /// Finish copying staged data, then release locks
    RollForward,
}

impl RecoveryDecision {
    pub fn judge(records: &[TempTableRecord]) -> Self {
        if records.is_empty() || records.iter().any(TempTableRecord::needs_rollback) {
            RecoveryDecision::RollBack
        } else {
            RecoveryDecision::RollForward
        }
    }
}

/// Result of recovering one jobflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobflowRecovery {
    RolledBack,
    RolledForward,
    /// Another process still holds the instance lock
    Busy,
    Failed,
}

/// Aggregated result over every jobflow instance a recovery run touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryOutcome {
    rolled_back: bool,
    busy: bool,
    failed: bool,
}

impl RecoveryOutcome {
    pub fn record(&mut self, result: JobflowRecovery) {
        match result {
            JobflowRecovery::RolledBack => self.rolled_back = true,
            JobflowRecovery::RolledForward => {},
            JobflowRecovery::Busy => self.busy = true,
            JobflowRecovery::Failed => self.failed = true,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.failed || self.busy {
            ExitCode::Error
        } else if self.rolled_back {
            ExitCode::Warning
        } else {
            ExitCode::Success
        }
    }
}

impl FromIterator<JobflowRecovery> for RecoveryOutcome {
    fn from_iter<I: IntoIterator<Item = JobflowRecovery>>(iter: I) -> Self {
        let mut outcome = Self::default();
        for result in iter {
            outcome.record(result);
        }
        outcome
    }
}
