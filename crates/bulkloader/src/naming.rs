//! File, path and table naming
//!
//! TSV file names:
//! - import: `IMP_<target>_<jobflow>_<executionId>_<table>.tsv`
//! - export: `EXP_<target>_<jobflow>_<executionId>_<table>_<seq>.tsv`
//!
//! Inside a transfer archive the short forms `IMP_<table>.tsv` and
//! `EXP_<table>_<seq>.tsv` are used; the table is recovered from them on
//! the receiving side.

use bulkloader_common::VariableTable;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

pub const IMPORT_FILE_PREFIX: &str = "IMP";
pub const EXPORT_FILE_PREFIX: &str = "EXP";
pub const FILE_DELIMITER: &str = "_";
pub const FILE_EXTENSION: &str = ".tsv";

pub const TEMP_TABLE_PREFIX: &str = "EXPORT_TEMP_";
pub const DUPLICATE_FLAG_SUFFIX: &str = "_DF";

/// Longest table name the database accepts
pub const MAX_TABLE_NAME_LEN: usize = 64;

/// Room left for the export table name inside a temp table name:
/// prefix, delimiter, a 19 digit sequence and the `_DF` suffix.
pub const TEMP_TABLE_BASE_LEN: usize =
    MAX_TABLE_NAME_LEN - TEMP_TABLE_PREFIX.len() - 1 - 19 - DUPLICATE_FLAG_SUFFIX.len();

/// Root directory of per-user data on the distributed filesystem
pub const DFS_USER_ROOT: &str = "/user";

/// Path variable holding the owning user
pub const VAR_USER: &str = "user";
/// Path variable holding the jobflow execution id
pub const VAR_EXECUTION_ID: &str = "execution_id";

#[allow(clippy::unwrap_used)]
static URI_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=]|%[0-9A-Fa-f]{2}|[^\x00-\x7F])*$").unwrap()
});

#[allow(clippy::unwrap_used)]
static URI_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+\-.]*$").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Builds and parses the names shared by the import and export sides
pub trait PathNamingService: Send + Sync {
    fn import_file_path(&self, dir: &Path, target: &str, jobflow_id: &str, execution_id: &str, table: &str)
        -> PathBuf;

    fn export_file_path(
        &self,
        dir: &Path,
        target: &str,
        jobflow_id: &str,
        execution_id: &str,
        table: &str,
        seq: u32,
    ) -> PathBuf;

    fn send_import_file_name(&self, table: &str) -> String;

    fn send_export_file_name(&self, table: &str, seq: u32) -> String;

    /// Table name carried by a short import file name
    fn import_table_of(&self, file_name: &str) -> Option<String>;

    /// Table name carried by a short export file name
    fn export_table_of(&self, file_name: &str) -> Option<String>;

    fn temp_table_name(&self, table: &str, seq: i64) -> String;

    fn duplicate_flag_table_name(&self, temp_table: &str) -> String;

    /// Expand `${user}` and `${execution_id}` in a path template and place the
    /// result under the distributed filesystem user root
    fn resolve_dfs_path(&self, template: &str, user: &str, execution_id: &str) -> Result<String, NamingError>;
}

/// Naming rules used in production
#[derive(Debug, Clone, Default)]
pub struct DefaultPathNaming {
    dfs_host: String,
}

impl DefaultPathNaming {
    /// `dfs_host` is the `scheme://host:port` prefix of distributed filesystem paths
    pub fn new(dfs_host: impl Into<String>) -> Self {
        Self {
            dfs_host: dfs_host.into(),
        }
    }
}

impl PathNamingService for DefaultPathNaming {
    fn import_file_path(
        &self,
        dir: &Path,
        target: &str,
        jobflow_id: &str,
        execution_id: &str,
        table: &str,
    ) -> PathBuf {
        let name = [IMPORT_FILE_PREFIX, target, jobflow_id, execution_id, table].join(FILE_DELIMITER);
        dir.join(format!("{name}{FILE_EXTENSION}"))
    }

    fn export_file_path(
        &self,
        dir: &Path,
        target: &str,
        jobflow_id: &str,
        execution_id: &str,
        table: &str,
        seq: u32,
    ) -> PathBuf {
        let seq = seq.to_string();
        let name = [EXPORT_FILE_PREFIX, target, jobflow_id, execution_id, table, &seq].join(FILE_DELIMITER);
        dir.join(format!("{name}{FILE_EXTENSION}"))
    }

    fn send_import_file_name(&self, table: &str) -> String {
        format!("{IMPORT_FILE_PREFIX}{FILE_DELIMITER}{table}{FILE_EXTENSION}")
    }

    fn send_export_file_name(&self, table: &str, seq: u32) -> String {
        format!("{EXPORT_FILE_PREFIX}{FILE_DELIMITER}{table}{FILE_DELIMITER}{seq}{FILE_EXTENSION}")
    }

    fn import_table_of(&self, file_name: &str) -> Option<String> {
        let name = base_name(file_name);
        let table = name
            .strip_prefix(IMPORT_FILE_PREFIX)?
            .strip_prefix(FILE_DELIMITER)?
            .strip_suffix(FILE_EXTENSION)?;
        (!table.is_empty()).then(|| table.to_string())
    }

    fn export_table_of(&self, file_name: &str) -> Option<String> {
        let name = base_name(file_name);
        let rest = name
            .strip_prefix(EXPORT_FILE_PREFIX)?
            .strip_prefix(FILE_DELIMITER)?;
        let (table, _seq) = rest.rsplit_once(FILE_DELIMITER)?;
        (!table.is_empty()).then(|| table.to_string())
    }

    fn temp_table_name(&self, table: &str, seq: i64) -> String {
        let base: String = table.chars().take(TEMP_TABLE_BASE_LEN).collect();
        format!("{TEMP_TABLE_PREFIX}{base}_{seq}")
    }

    fn duplicate_flag_table_name(&self, temp_table: &str) -> String {
        format!("{temp_table}{DUPLICATE_FLAG_SUFFIX}")
    }

    fn resolve_dfs_path(&self, template: &str, user: &str, execution_id: &str) -> Result<String, NamingError> {
        let expanded = expand_path(template, &VariableTable::new(), user, execution_id);
        let resolved = format!("{}{DFS_USER_ROOT}{expanded}", self.dfs_host);
        check_uri(&resolved)?;
        Ok(resolved)
    }
}

/// Per-table sequence for export file names, starting at 1
#[derive(Debug, Clone, Default)]
pub struct ExportFileSequence {
    seqs: HashMap<String, u32>,
}

impl ExportFileSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, table: &str) -> u32 {
        let seq = self.seqs.entry(table.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }
}

/// Check that a path template is well formed once its variables are known.
///
/// The template is expanded with `variables` (batch arguments and the caller)
/// plus placeholder values for `${user}` and `${execution_id}`. A variable
/// defined nowhere is left unexpanded and makes the path invalid.
pub fn check_path_template(template: &str, variables: &VariableTable) -> Result<(), NamingError> {
    check_uri(&expand_path(template, variables, "dummyuser", "dummyid"))
}

fn expand_path(template: &str, variables: &VariableTable, user: &str, execution_id: &str) -> String {
    let mut variables = variables.clone();
    variables.define(VAR_USER, user);
    variables.define(VAR_EXECUTION_ID, execution_id);
    // lenient expansion cannot fail
    variables
        .parse(template, false)
        .unwrap_or_else(|_| template.to_string())
}

fn check_uri(candidate: &str) -> Result<(), NamingError> {
    let invalid = |reason: &str| NamingError::InvalidPath {
        path: candidate.to_string(),
        reason: reason.to_string(),
    };

    if !URI_CHARS.is_match(candidate) {
        return Err(invalid("contains characters not allowed in a URI"));
    }
    if candidate.matches('#').count() > 1 {
        return Err(invalid("more than one fragment separator"));
    }

    let head_end = candidate.find(['/', '?', '#']).unwrap_or(candidate.len());
    if let Some(colon) = candidate[..head_end].find(':') {
        let scheme = &candidate[..colon];
        if !URI_SCHEME.is_match(scheme) {
            return Err(invalid("malformed scheme"));
        }
        if colon + 1 == candidate.len() {
            return Err(invalid("missing scheme-specific part"));
        }
    }
    Ok(())
}

fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_import_and_export_file_paths() {
        let naming = DefaultPathNaming::default();
        let dir = Path::new("/var/bulkloader/import");

        assert_eq!(
            naming.import_file_path(dir, "target1", "JBF01", "EXE01", "ORDERS"),
            PathBuf::from("/var/bulkloader/import/IMP_target1_JBF01_EXE01_ORDERS.tsv")
        );
        assert_eq!(
            naming.export_file_path(dir, "target1", "JBF01", "EXE01", "ORDERS", 2),
            PathBuf::from("/var/bulkloader/import/EXP_target1_JBF01_EXE01_ORDERS_2.tsv")
        );
    }

    #[test]
    fn test_send_file_names_round_trip_table() {
        let naming = DefaultPathNaming::default();
        let import = naming.send_import_file_name("ITEM_MASTER");
        assert_eq!(import, "IMP_ITEM_MASTER.tsv");
        assert_eq!(naming.import_table_of(&import).as_deref(), Some("ITEM_MASTER"));

        let export = naming.send_export_file_name("ITEM_MASTER", 3);
        assert_eq!(export, "EXP_ITEM_MASTER_3.tsv");
        assert_eq!(naming.export_table_of(&format!("dir/{export}")).as_deref(), Some("ITEM_MASTER"));
    }

    #[test]
    fn test_table_of_rejects_foreign_names() {
        let naming = DefaultPathNaming::default();
        assert_eq!(naming.import_table_of("EXP_A_1.tsv"), None);
        assert_eq!(naming.export_table_of("EXP_.tsv"), None);
        assert_eq!(naming.import_table_of("IMP_A.csv"), None);
    }

    #[test]
    fn test_export_sequence_per_table() {
        let mut seq = ExportFileSequence::new();
        assert_eq!(seq.next("A"), 1);
        assert_eq!(seq.next("A"), 2);
        assert_eq!(seq.next("B"), 1);
        assert_eq!(seq.next("A"), 3);
    }

    #[test]
    fn test_temp_table_names() {
        let naming = DefaultPathNaming::default();
        assert_eq!(TEMP_TABLE_BASE_LEN, 29);
        assert_eq!(naming.temp_table_name("ORDERS", 7), "EXPORT_TEMP_ORDERS_7");

        let long = "A".repeat(40);
        let temp = naming.temp_table_name(&long, i64::MAX);
        assert!(temp.starts_with(&format!("EXPORT_TEMP_{}_", "A".repeat(29))));
        assert!(naming.duplicate_flag_table_name(&temp).len() <= MAX_TABLE_NAME_LEN);
        assert_eq!(naming.duplicate_flag_table_name("EXPORT_TEMP_ORDERS_7"), "EXPORT_TEMP_ORDERS_7_DF");
    }

    #[test]
    fn test_path_templates() {
        let none = VariableTable::new();
        assert!(check_path_template("/${user}/${execution_id}/import/XXX", &none).is_ok());
        assert!(check_path_template("asakusa/import/XXX", &none).is_ok());
        assert!(check_path_template("/a%20b", &none).is_ok());
        assert!(check_path_template("/${batch}/import", &none).is_err());
        assert!(check_path_template("/path with space", &none).is_err());
        assert!(check_path_template("/a%zz", &none).is_err());
        assert!(check_path_template("1bad:/x", &none).is_err());
    }

    #[test]
    fn test_path_templates_use_batch_arguments() {
        let mut args = VariableTable::new();
        args.define("date", "20240101");
        args.define("__caller__", "scheduler");

        let template = "/${user}/${execution_id}/${date}/ORDERS";
        assert!(check_path_template(template, &args).is_ok());
        assert!(check_path_template(template, &VariableTable::new()).is_err());
        assert!(check_path_template("/${user}/${region}/ORDERS", &args).is_err());
    }

    #[test]
    fn test_resolve_dfs_path() {
        let naming = DefaultPathNaming::new("hdfs://namenode:8020");
        let resolved = naming
            .resolve_dfs_path("/${user}/${execution_id}/out", "asakusa", "EXE01")
            .unwrap();
        assert_eq!(resolved, "hdfs://namenode:8020/user/asakusa/EXE01/out");
    }
}
