//! Per-table rule checks
//!
//! Each check stops at the first failing rule of a table.

use super::spec::{TableExportSpec, TableImportSpec};
use super::{
    ParamError, ATTR_BEAN_NAME, ATTR_ERROR_CODE, ATTR_ERROR_COLUMN, ATTR_ERROR_TABLE_COLUMN, ATTR_EXPORT_TABLE_COLUMN,
    ATTR_HDFS_EXPORT_FILE, ATTR_HDFS_IMPORT_FILE, ATTR_KEY_COLUMN, ATTR_LOCKED_OPERATION, ATTR_LOCK_TYPE,
    ATTR_SEARCH_CONDITION, ATTR_TARGET_COLUMN, ATTR_TSV_COLUMN,
};
use crate::columns::SystemColumns;
use crate::naming::check_path_template;
use bulkloader_common::types::{is_consistent_lock_pair, LockType, LockedOperation};
use bulkloader_common::VariableTable;

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn is_empty_or_has_blank(values: &[String]) -> bool {
    values.is_empty() || values.iter().any(|v| is_blank(v))
}

fn missing_from<'a>(columns: &'a [String], allowed: &[&str]) -> Vec<&'a str> {
    columns
        .iter()
        .map(String::as_str)
        .filter(|c| !allowed.contains(c))
        .collect()
}

/// Rules for tables with a cache id; applied while the properties are read
pub(crate) fn check_cache(spec: &TableImportSpec) -> Result<(), ParamError> {
    if !spec.uses_cache() {
        return Ok(());
    }
    let table = spec.table.as_str();

    match &spec.record_type {
        Some(record_type) if !record_type.supports_cache => {
            return Err(ParamError::invalid(
                table,
                ATTR_BEAN_NAME,
                format!("record type {} does not support cache", record_type.name),
            ));
        },
        Some(_) => {},
        None => {
            return Err(ParamError::invalid(table, ATTR_BEAN_NAME, "cache requires a record type"));
        },
    }

    if spec.search_condition.as_deref().is_some_and(|c| !is_blank(c)) {
        return Err(ParamError::invalid(
            table,
            ATTR_SEARCH_CONDITION,
            "search condition must be empty when cache is used",
        ));
    }

    if spec.locked_operation == Some(LockedOperation::Off) {
        return Err(ParamError::invalid(
            table,
            ATTR_LOCKED_OPERATION,
            "locked rows cannot be skipped when cache is used",
        ));
    }
    Ok(())
}

/// Import rules; expands the search condition in place
pub(crate) fn check_import(
    spec: &mut TableImportSpec,
    is_primary: bool,
    variables: &VariableTable,
) -> Result<(), ParamError> {
    let table_name = spec.table.clone();
    let table = table_name.as_str();

    if is_empty_or_has_blank(&spec.columns) {
        return Err(ParamError::invalid(table, ATTR_TARGET_COLUMN, "target columns are not set"));
    }

    let Some(lock_type) = spec.lock_type else {
        return Err(ParamError::invalid(table, ATTR_LOCK_TYPE, "lock type is missing or unknown"));
    };
    if !is_primary && lock_type != LockType::None {
        return Err(ParamError::invalid(
            table,
            ATTR_LOCK_TYPE,
            format!("secondary import requires lock type {}", LockType::None),
        ));
    }

    let Some(operation) = spec.locked_operation else {
        return Err(ParamError::invalid(
            table,
            ATTR_LOCKED_OPERATION,
            "locked operation is missing or unknown",
        ));
    };
    if !is_primary && operation != LockedOperation::Force {
        return Err(ParamError::invalid(
            table,
            ATTR_LOCKED_OPERATION,
            format!("secondary import requires locked operation {}", LockedOperation::Force),
        ));
    }

    if !is_consistent_lock_pair(lock_type, operation) {
        return Err(ParamError::invalid(
            table,
            ATTR_LOCKED_OPERATION,
            format!("lock type {lock_type} cannot be combined with locked operation {operation}"),
        ));
    }

    if spec.record_type.is_none() {
        return Err(ParamError::invalid(table, ATTR_BEAN_NAME, "record type is not set"));
    }

    match spec.dfs_path.as_deref() {
        None => {
            return Err(ParamError::invalid(table, ATTR_HDFS_IMPORT_FILE, "destination path is not set"));
        },
        Some(path) if path.is_empty() => {
            return Err(ParamError::invalid(table, ATTR_HDFS_IMPORT_FILE, "destination path is not set"));
        },
        Some(path) => {
            check_path_template(path, variables)
                .map_err(|e| ParamError::invalid(table, ATTR_HDFS_IMPORT_FILE, e.to_string()))?;
        },
    }

    if let Some(condition) = spec.search_condition.as_deref() {
        let expanded = variables
            .parse(condition, true)
            .map_err(|e| ParamError::invalid(table, ATTR_SEARCH_CONDITION, e.to_string()))?;
        spec.search_condition = Some(expanded);
    }
    Ok(())
}

/// Export rules
pub(crate) fn check_export(
    spec: &TableExportSpec,
    system_columns: &SystemColumns,
    variables: &VariableTable,
) -> Result<(), ParamError> {
    let table = spec.table.as_str();
    check_export_columns(spec, system_columns)?;

    let mut allowed: Vec<&str> = spec.tsv_columns.iter().map(String::as_str).collect();
    allowed.extend(system_columns.names());

    let missing = missing_from(&spec.export_columns, &allowed);
    if !missing.is_empty() {
        return Err(ParamError::invalid(
            table,
            ATTR_EXPORT_TABLE_COLUMN,
            format!("columns not in the TSV file: {}", missing.join(",")),
        ));
    }

    if spec.is_duplicate_check() {
        if is_empty_or_has_blank(&spec.error_table_columns) {
            return Err(ParamError::invalid(
                table,
                ATTR_ERROR_TABLE_COLUMN,
                "error table columns are not set",
            ));
        }
        let missing = missing_from(&spec.error_table_columns, &allowed);
        if !missing.is_empty() {
            return Err(ParamError::invalid(
                table,
                ATTR_ERROR_TABLE_COLUMN,
                format!("columns not in the TSV file: {}", missing.join(",")),
            ));
        }
        if is_empty_or_has_blank(&spec.key_columns) {
            return Err(ParamError::invalid(table, ATTR_KEY_COLUMN, "key columns are not set"));
        }
        check_error_code(spec)?;
    }

    if spec.record_type.is_none() {
        return Err(ParamError::invalid(table, ATTR_BEAN_NAME, "record type is not set"));
    }

    if spec.dfs_paths.is_empty() {
        return Err(ParamError::invalid(table, ATTR_HDFS_EXPORT_FILE, "source paths are not set"));
    }
    for path in &spec.dfs_paths {
        if path.is_empty() {
            return Err(ParamError::invalid(table, ATTR_HDFS_EXPORT_FILE, "source path list has an empty entry"));
        }
        check_path_template(path, variables)
            .map_err(|e| ParamError::invalid(table, ATTR_HDFS_EXPORT_FILE, e.to_string()))?;
    }
    Ok(())
}

/// The subset of export rules that recovery depends on
pub(crate) fn check_recovery_export(
    spec: &TableExportSpec,
    system_columns: &SystemColumns,
) -> Result<(), ParamError> {
    check_export_columns(spec, system_columns)?;
    if spec.is_duplicate_check() {
        if is_empty_or_has_blank(&spec.error_table_columns) {
            return Err(ParamError::invalid(
                &spec.table,
                ATTR_ERROR_TABLE_COLUMN,
                "error table columns are not set",
            ));
        }
        check_error_code(spec)?;
    }
    Ok(())
}

fn check_export_columns(spec: &TableExportSpec, system_columns: &SystemColumns) -> Result<(), ParamError> {
    let table = spec.table.as_str();
    if is_empty_or_has_blank(&spec.tsv_columns) {
        return Err(ParamError::invalid(table, ATTR_TSV_COLUMN, "TSV columns are not set"));
    }
    if is_empty_or_has_blank(&spec.export_columns) {
        return Err(ParamError::invalid(table, ATTR_EXPORT_TABLE_COLUMN, "export table columns are not set"));
    }
    if spec.export_columns.contains(&system_columns.temp_sid) {
        return Err(ParamError::invalid(
            table,
            ATTR_EXPORT_TABLE_COLUMN,
            format!("{} is reserved for staging tables", system_columns.temp_sid),
        ));
    }
    Ok(())
}

fn check_error_code(spec: &TableExportSpec) -> Result<(), ParamError> {
    let table = spec.table.as_str();
    let column = match spec.error_code_column.as_deref() {
        Some(column) if !column.is_empty() => column,
        _ => {
            return Err(ParamError::invalid(table, ATTR_ERROR_COLUMN, "error code column is not set"));
        },
    };
    if spec.export_columns.iter().any(|c| c == column) {
        return Err(ParamError::invalid(
            table,
            ATTR_ERROR_COLUMN,
            "error code column is also an export table column",
        ));
    }
    if spec.error_table_columns.iter().any(|c| c == column) {
        return Err(ParamError::invalid(
            table,
            ATTR_ERROR_COLUMN,
            "error code column is also an error table column",
        ));
    }
    if spec.error_code.as_deref().is_none_or(str::is_empty) {
        return Err(ParamError::invalid(table, ATTR_ERROR_CODE, "error code is not set"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::params::RecordType;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn import_spec() -> TableImportSpec {
        TableImportSpec {
            table: "ORDERS".to_string(),
            columns: cols(&["ID", "AMOUNT"]),
            search_condition: None,
            cache_id: None,
            lock_type: Some(LockType::Table),
            locked_operation: Some(LockedOperation::Error),
            record_type: Some(RecordType::new("Orders", true)),
            dfs_path: Some("/${user}/${execution_id}/import/ORDERS".to_string()),
        }
    }

    fn export_spec() -> TableExportSpec {
        TableExportSpec {
            table: "ORDERS".to_string(),
            tsv_columns: cols(&["ID", "AMOUNT"]),
            export_columns: cols(&["ID", "AMOUNT", "SID"]),
            error_table: Some("ORDERS_ERR".to_string()),
            error_table_columns: cols(&["ID", "AMOUNT"]),
            key_columns: cols(&["ID"]),
            error_code_column: Some("ERR_CODE".to_string()),
            error_code: Some("E01".to_string()),
            record_type: Some(RecordType::new("Orders", false)),
            dfs_paths: cols(&["/${user}/${execution_id}/export/ORDERS"]),
        }
    }

    fn attribute_of(err: ParamError) -> String {
        match err {
            ParamError::Invalid { attribute, .. } => attribute,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_valid_import() {
        let mut spec = import_spec();
        check_import(&mut spec, true, &VariableTable::new()).unwrap();
    }

    #[test]
    fn test_import_rejects_blank_column() {
        let mut spec = import_spec();
        spec.columns = cols(&["ID", "", "AMOUNT"]);
        let err = check_import(&mut spec, true, &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_TARGET_COLUMN);

        spec.columns = cols(&["ID", "   "]);
        let err = check_import(&mut spec, true, &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_TARGET_COLUMN);
    }

    #[test]
    fn test_import_rejects_forbidden_pair() {
        let mut spec = import_spec();
        spec.locked_operation = Some(LockedOperation::Off);
        let err = check_import(&mut spec, true, &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_LOCKED_OPERATION);
    }

    #[test]
    fn test_secondary_import_requires_none_force() {
        let mut spec = import_spec();
        let err = check_import(&mut spec, false, &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_LOCK_TYPE);

        spec.lock_type = Some(LockType::None);
        let err = check_import(&mut spec, false, &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_LOCKED_OPERATION);

        spec.locked_operation = Some(LockedOperation::Force);
        check_import(&mut spec, false, &VariableTable::new()).unwrap();
    }

    #[test]
    fn test_import_rejects_invalid_path() {
        let mut spec = import_spec();
        spec.dfs_path = Some("/${batch}/import".to_string());
        let err = check_import(&mut spec, true, &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_HDFS_IMPORT_FILE);
    }

    #[test]
    fn test_paths_expand_batch_arguments() {
        let mut variables = VariableTable::new();
        variables.define("date", "20240101");

        let mut spec = import_spec();
        spec.dfs_path = Some("/${user}/${execution_id}/${date}/ORDERS".to_string());
        check_import(&mut spec, true, &variables).unwrap();
        let err = check_import(&mut spec, true, &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_HDFS_IMPORT_FILE);

        let mut spec = export_spec();
        spec.dfs_paths = cols(&["/${user}/${execution_id}/${date}/export/ORDERS"]);
        check_export(&spec, &SystemColumns::default(), &variables).unwrap();
        let err = check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_HDFS_EXPORT_FILE);
    }

    #[test]
    fn test_import_expands_search_condition() {
        let mut variables = VariableTable::new();
        variables.define("region", "tokyo");

        let mut spec = import_spec();
        spec.search_condition = Some("REGION='${region}'".to_string());
        check_import(&mut spec, true, &variables).unwrap();
        assert_eq!(spec.search_condition.as_deref(), Some("REGION='tokyo'"));

        spec.search_condition = Some("REGION='${unknown}'".to_string());
        let err = check_import(&mut spec, true, &variables).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_SEARCH_CONDITION);
    }

    #[test]
    fn test_cache_rules() {
        let mut spec = import_spec();
        spec.cache_id = Some("orders-cache".to_string());
        check_cache(&spec).unwrap();

        spec.search_condition = Some("ID > 0".to_string());
        assert_eq!(attribute_of(check_cache(&spec).unwrap_err()), ATTR_SEARCH_CONDITION);

        spec.search_condition = Some("  ".to_string());
        spec.locked_operation = Some(LockedOperation::Off);
        assert_eq!(attribute_of(check_cache(&spec).unwrap_err()), ATTR_LOCKED_OPERATION);

        spec.locked_operation = Some(LockedOperation::Force);
        spec.record_type = Some(RecordType::new("Orders", false));
        assert_eq!(attribute_of(check_cache(&spec).unwrap_err()), ATTR_BEAN_NAME);
    }

    #[test]
    fn test_valid_export() {
        check_export(&export_spec(), &SystemColumns::default(), &VariableTable::new()).unwrap();
    }

    #[test]
    fn test_export_rejects_temp_sid() {
        let mut spec = export_spec();
        spec.export_columns.push("__TEMP_SID".to_string());
        let err = check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_EXPORT_TABLE_COLUMN);
    }

    #[test]
    fn test_export_rejects_unknown_column() {
        let mut spec = export_spec();
        spec.export_columns.push("NOT_IN_TSV".to_string());
        let err = check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err();
        assert!(err.to_string().contains("NOT_IN_TSV"));
    }

    #[test]
    fn test_duplicate_check_requires_error_code_column() {
        let mut spec = export_spec();
        spec.error_code_column = Some(String::new());
        let err = check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_ERROR_COLUMN);

        spec.error_code_column = None;
        let err = check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_ERROR_COLUMN);
    }

    #[test]
    fn test_error_code_column_must_not_be_copied() {
        let mut spec = export_spec();
        spec.tsv_columns.push("ERR_CODE".to_string());
        spec.error_table_columns.push("ERR_CODE".to_string());
        let err = check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err();
        assert_eq!(attribute_of(err), ATTR_ERROR_COLUMN);
    }

    #[test]
    fn test_export_path_rules() {
        let mut spec = export_spec();
        spec.dfs_paths = cols(&["/a", ""]);
        assert_eq!(
            attribute_of(check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err()),
            ATTR_HDFS_EXPORT_FILE
        );

        spec.dfs_paths.clear();
        assert_eq!(
            attribute_of(check_export(&spec, &SystemColumns::default(), &VariableTable::new()).unwrap_err()),
            ATTR_HDFS_EXPORT_FILE
        );
    }

    #[test]
    fn test_recovery_subset_skips_paths_and_keys() {
        let mut spec = export_spec();
        spec.dfs_paths.clear();
        spec.record_type = None;
        spec.key_columns.clear();
        check_recovery_export(&spec, &SystemColumns::default()).unwrap();

        spec.error_code = None;
        assert_eq!(
            attribute_of(check_recovery_export(&spec, &SystemColumns::default()).unwrap_err()),
            ATTR_ERROR_CODE
        );
    }
}
