//! Reads jobflow properties into validated per-table specs

use super::source::{Direction, JobflowPropertySource, RecordTypeRegistry};
use super::spec::{RecordType, TableExportSpec, TableImportSpec};
use super::validate::{check_cache, check_export, check_import, check_recovery_export};
use super::{
    split_key, split_list, ParamError, ATTR_BEAN_NAME, ATTR_CACHE_ID, ATTR_ERROR_CODE, ATTR_ERROR_COLUMN,
    ATTR_ERROR_TABLE, ATTR_ERROR_TABLE_COLUMN, ATTR_EXPORT_TABLE_COLUMN, ATTR_HDFS_EXPORT_FILE, ATTR_HDFS_IMPORT_FILE,
    ATTR_KEY_COLUMN, ATTR_LOCKED_OPERATION, ATTR_LOCK_TYPE, ATTR_SEARCH_CONDITION, ATTR_TARGET_COLUMN,
    ATTR_TSV_COLUMN, EXPORT_TARGET_TABLE, IMPORT_TARGET_TABLE,
};
use crate::columns::SystemColumns;
use crate::config::BulkloaderConfig;
use crate::properties::Properties;
use bulkloader_common::types::{LockType, LockedOperation};
use bulkloader_common::VariableTable;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Specs read for recovery. Import tables are read but not checked.
#[derive(Debug, Clone, Default)]
pub struct RecoverySpecs {
    pub imports: BTreeMap<String, TableImportSpec>,
    pub exports: BTreeMap<String, TableExportSpec>,
}

/// Identifies the jobflow being loaded in log output
struct LoadContext<'a> {
    target: &'a str,
    batch_id: &'a str,
    jobflow_id: &'a str,
}

pub struct ParameterLoader {
    source: Arc<dyn JobflowPropertySource>,
    registry: Arc<dyn RecordTypeRegistry>,
    variables: VariableTable,
    system_columns: SystemColumns,
}

impl ParameterLoader {
    pub fn new(
        config: &BulkloaderConfig,
        source: Arc<dyn JobflowPropertySource>,
        registry: Arc<dyn RecordTypeRegistry>,
    ) -> Self {
        Self {
            source,
            registry,
            variables: config.variables.clone(),
            system_columns: config.system_columns.clone(),
        }
    }

    /// Import specs for a primary or secondary import
    pub fn load_import_specs(
        &self,
        target: &str,
        batch_id: &str,
        jobflow_id: &str,
        is_primary: bool,
    ) -> Result<BTreeMap<String, TableImportSpec>, ParamError> {
        let ctx = LoadContext {
            target,
            batch_id,
            jobflow_id,
        };
        let result = self.read_imports(&ctx).and_then(|mut specs| {
            self.check_imports(&mut specs, is_primary)?;
            Ok(specs)
        });
        report(&ctx, "import", result)
    }

    /// Import specs for extraction: search conditions are dropped and the
    /// tables are checked as a primary import
    pub fn load_extract_specs(
        &self,
        target: &str,
        batch_id: &str,
        jobflow_id: &str,
    ) -> Result<BTreeMap<String, TableImportSpec>, ParamError> {
        let ctx = LoadContext {
            target,
            batch_id,
            jobflow_id,
        };
        let result = self.read_imports(&ctx).and_then(|mut specs| {
            for spec in specs.values_mut() {
                spec.search_condition = None;
            }
            self.check_imports(&mut specs, true)?;
            Ok(specs)
        });
        report(&ctx, "extract", result)
    }

    /// Cache-enabled tables only, read without locks
    pub fn load_cache_build_specs(
        &self,
        target: &str,
        batch_id: &str,
        jobflow_id: &str,
    ) -> Result<BTreeMap<String, TableImportSpec>, ParamError> {
        let ctx = LoadContext {
            target,
            batch_id,
            jobflow_id,
        };
        let result = self.read_imports(&ctx).and_then(|specs| {
            let mut cached: BTreeMap<String, TableImportSpec> = specs
                .into_iter()
                .filter(|(table, spec)| {
                    if !spec.uses_cache() {
                        debug!(table = %table, "Table does not use cache");
                    }
                    spec.uses_cache()
                })
                .map(|(table, mut spec)| {
                    spec.lock_type = Some(LockType::None);
                    spec.locked_operation = Some(LockedOperation::Force);
                    (table, spec)
                })
                .collect();
            self.check_imports(&mut cached, false)?;
            Ok(cached)
        });
        report(&ctx, "cache build", result)
    }

    pub fn load_export_specs(
        &self,
        target: &str,
        batch_id: &str,
        jobflow_id: &str,
    ) -> Result<BTreeMap<String, TableExportSpec>, ParamError> {
        let ctx = LoadContext {
            target,
            batch_id,
            jobflow_id,
        };
        let result = self.read_exports(&ctx).and_then(|specs| {
            for spec in specs.values() {
                check_export(spec, &self.system_columns, &self.variables)?;
            }
            Ok(specs)
        });
        report(&ctx, "export", result)
    }

    /// Both directions, with only the export rules recovery depends on
    pub fn load_recovery_specs(
        &self,
        target: &str,
        batch_id: &str,
        jobflow_id: &str,
    ) -> Result<RecoverySpecs, ParamError> {
        let ctx = LoadContext {
            target,
            batch_id,
            jobflow_id,
        };
        let result = self.read_imports(&ctx).and_then(|imports| {
            let exports = self.read_exports(&ctx)?;
            for spec in exports.values() {
                check_recovery_export(spec, &self.system_columns)?;
            }
            Ok(RecoverySpecs { imports, exports })
        });
        let specs = match result {
            Ok(specs) => specs,
            Err(e) => {
                log_failure(&ctx, "recovery", &e);
                return Err(e);
            },
        };
        info!(
            target_name = ctx.target,
            jobflow_id = ctx.jobflow_id,
            imports = specs.imports.len(),
            exports = specs.exports.len(),
            "Loaded recovery parameters"
        );
        Ok(specs)
    }

    fn check_imports(
        &self,
        specs: &mut BTreeMap<String, TableImportSpec>,
        is_primary: bool,
    ) -> Result<(), ParamError> {
        for spec in specs.values_mut() {
            check_import(spec, is_primary, &self.variables)?;
        }
        Ok(())
    }

    fn read_imports(&self, ctx: &LoadContext<'_>) -> Result<BTreeMap<String, TableImportSpec>, ParamError> {
        let props = self
            .source
            .read(Direction::Import, ctx.target, ctx.batch_id, ctx.jobflow_id)?;
        let specs = self.parse_imports(&props)?;
        for spec in specs.values() {
            check_cache(spec)?;
        }
        Ok(specs)
    }

    fn read_exports(&self, ctx: &LoadContext<'_>) -> Result<BTreeMap<String, TableExportSpec>, ParamError> {
        let props = self
            .source
            .read(Direction::Export, ctx.target, ctx.batch_id, ctx.jobflow_id)?;
        self.parse_exports(&props)
    }

    fn parse_imports(&self, props: &Properties) -> Result<BTreeMap<String, TableImportSpec>, ParamError> {
        let mut specs: BTreeMap<String, TableImportSpec> = match props.get(IMPORT_TARGET_TABLE) {
            Some(tables) if !tables.is_empty() => split_list(tables)
                .into_iter()
                .map(|table| (table.clone(), TableImportSpec::new(table)))
                .collect(),
            _ => return Ok(BTreeMap::new()),
        };

        for (key, value) in props {
            if key == IMPORT_TARGET_TABLE {
                continue;
            }
            let (table, attribute) = split_key(key)?;
            let Some(spec) = specs.get_mut(table) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }

            match attribute {
                ATTR_TARGET_COLUMN => spec.columns = split_list(value),
                ATTR_SEARCH_CONDITION => spec.search_condition = Some(value.clone()),
                ATTR_CACHE_ID => {
                    if !value.trim().is_empty() {
                        spec.cache_id = Some(value.clone());
                    }
                },
                ATTR_LOCK_TYPE => spec.lock_type = LockType::find(value),
                ATTR_LOCKED_OPERATION => spec.locked_operation = LockedOperation::find(value),
                ATTR_BEAN_NAME => spec.record_type = Some(self.resolve_record_type(table, value)?),
                ATTR_HDFS_IMPORT_FILE => spec.dfs_path = Some(value.clone()),
                _ => warn!(key = %key, table, "Unknown import setting, skipped"),
            }
        }
        Ok(specs)
    }

    fn parse_exports(&self, props: &Properties) -> Result<BTreeMap<String, TableExportSpec>, ParamError> {
        let mut specs: BTreeMap<String, TableExportSpec> = match props.get(EXPORT_TARGET_TABLE) {
            Some(tables) if !tables.is_empty() => split_list(tables)
                .into_iter()
                .map(|table| (table.clone(), TableExportSpec::new(table)))
                .collect(),
            _ => return Ok(BTreeMap::new()),
        };

        for (key, value) in props {
            if key == EXPORT_TARGET_TABLE {
                continue;
            }
            let (table, attribute) = split_key(key)?;
            let Some(spec) = specs.get_mut(table) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }

            match attribute {
                ATTR_ERROR_TABLE => spec.error_table = Some(value.clone()),
                ATTR_TSV_COLUMN => spec.tsv_columns = split_list(value),
                ATTR_EXPORT_TABLE_COLUMN => spec.export_columns = split_list(value),
                ATTR_ERROR_TABLE_COLUMN => spec.error_table_columns = split_list(value),
                ATTR_KEY_COLUMN => spec.key_columns = split_list(value),
                ATTR_ERROR_COLUMN => spec.error_code_column = Some(value.clone()),
                ATTR_ERROR_CODE => spec.error_code = Some(value.clone()),
                ATTR_BEAN_NAME => spec.record_type = Some(self.resolve_record_type(table, value)?),
                ATTR_HDFS_EXPORT_FILE => spec.dfs_paths = split_list(value),
                _ => warn!(key = %key, table, "Unknown export setting, skipped"),
            }
        }
        Ok(specs)
    }

    fn resolve_record_type(&self, table: &str, name: &str) -> Result<RecordType, ParamError> {
        self.registry
            .resolve(name)
            .ok_or_else(|| ParamError::UnknownRecordType {
                table: table.to_string(),
                name: name.to_string(),
            })
    }
}

fn report<T>(
    ctx: &LoadContext<'_>,
    kind: &str,
    result: Result<BTreeMap<String, T>, ParamError>,
) -> Result<BTreeMap<String, T>, ParamError> {
    match &result {
        Ok(specs) => info!(
            target_name = ctx.target,
            batch_id = ctx.batch_id,
            jobflow_id = ctx.jobflow_id,
            tables = specs.len(),
            "Loaded {kind} parameters"
        ),
        Err(e) => log_failure(ctx, kind, e),
    }
    result
}

fn log_failure(ctx: &LoadContext<'_>, kind: &str, err: &ParamError) {
    error!(
        target_name = ctx.target,
        batch_id = ctx.batch_id,
        jobflow_id = ctx.jobflow_id,
        table = err.table().unwrap_or(""),
        error = %err,
        "Invalid {kind} parameters"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::params::source::StaticRecordTypeRegistry;
    use crate::properties::parse_properties;

    /// In-memory property sets keyed by direction
    #[derive(Default)]
    struct MemorySource {
        import: Properties,
        export: Properties,
    }

    impl JobflowPropertySource for MemorySource {
        fn read(&self, direction: Direction, _: &str, _: &str, _: &str) -> Result<Properties, ParamError> {
            Ok(match direction {
                Direction::Import => self.import.clone(),
                Direction::Export => self.export.clone(),
            })
        }
    }

    fn loader(import: &str, export: &str) -> ParameterLoader {
        let source = MemorySource {
            import: parse_properties(import),
            export: parse_properties(export),
        };
        let registry = StaticRecordTypeRegistry::new()
            .with_type("Orders", true)
            .with_type("Items", false);
        ParameterLoader::new(&BulkloaderConfig::default(), Arc::new(source), Arc::new(registry))
    }

    const IMPORT: &str = "\
import.target-table=ORDERS,ITEMS
ORDERS.target-column=ID,AMOUNT
ORDERS.search-condition=AMOUNT > 0
ORDERS.lock-type=1
ORDERS.locked-operation=3
ORDERS.bean-name=Orders
ORDERS.hdfs-import-file=/${user}/${execution_id}/import/ORDERS
ITEMS.target-column=ID,NAME
ITEMS.lock-type=3
ITEMS.locked-operation=2
ITEMS.bean-name=Items
ITEMS.hdfs-import-file=/${user}/${execution_id}/import/ITEMS
ITEMS.unknown-setting=ignored
OTHER.target-column=X
";

    #[test]
    fn test_load_import_specs() {
        let specs = loader(IMPORT, "").load_import_specs("t", "b", "j", true).unwrap();
        assert_eq!(specs.len(), 2);

        let orders = &specs["ORDERS"];
        assert_eq!(orders.columns, vec!["ID", "AMOUNT"]);
        assert_eq!(orders.lock_type, Some(LockType::Table));
        assert_eq!(orders.locked_operation, Some(LockedOperation::Error));
        assert_eq!(orders.search_condition.as_deref(), Some("AMOUNT > 0"));
        assert_eq!(orders.record_type.as_ref().unwrap().name, "Orders");
        assert!(!specs.contains_key("OTHER"));
    }

    #[test]
    fn test_secondary_import_rejects_locking_table() {
        let err = loader(IMPORT, "").load_import_specs("t", "b", "j", false).unwrap_err();
        assert_eq!(err.table(), Some("ORDERS"));
        assert!(matches!(err, ParamError::Invalid { ref attribute, .. } if attribute == ATTR_LOCK_TYPE));
    }

    #[test]
    fn test_unknown_lock_code_counts_as_missing() {
        let import = IMPORT.replace("ORDERS.lock-type=1", "ORDERS.lock-type=9");
        let err = loader(&import, "").load_import_specs("t", "b", "j", true).unwrap_err();
        assert!(matches!(
            err,
            ParamError::Invalid { ref table, ref attribute, .. } if table == "ORDERS" && attribute == ATTR_LOCK_TYPE
        ));
    }

    #[test]
    fn test_unknown_bean_name_fails() {
        let import = IMPORT.replace("ORDERS.bean-name=Orders", "ORDERS.bean-name=Missing");
        let err = loader(&import, "").load_import_specs("t", "b", "j", true).unwrap_err();
        assert!(matches!(err, ParamError::UnknownRecordType { .. }));
    }

    #[test]
    fn test_key_without_dot_fails() {
        let import = format!("{IMPORT}stray=1\n");
        let err = loader(&import, "").load_import_specs("t", "b", "j", true).unwrap_err();
        assert!(matches!(err, ParamError::MalformedKey(ref key) if key == "stray"));
    }

    #[test]
    fn test_no_target_tables() {
        let specs = loader("ORDERS.target-column=ID\n", "")
            .load_import_specs("t", "b", "j", true)
            .unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_extract_clears_search_condition() {
        let specs = loader(IMPORT, "").load_extract_specs("t", "b", "j").unwrap();
        assert_eq!(specs["ORDERS"].search_condition, None);
    }

    #[test]
    fn test_cache_build_keeps_cache_tables_only() {
        let import = IMPORT
            .replace("ORDERS.search-condition=AMOUNT > 0\n", "ORDERS.cache-id=orders\n");
        let specs = loader(&import, "").load_cache_build_specs("t", "b", "j").unwrap();
        assert_eq!(specs.keys().collect::<Vec<_>>(), vec!["ORDERS"]);
        assert_eq!(specs["ORDERS"].lock_type, Some(LockType::None));
        assert_eq!(specs["ORDERS"].locked_operation, Some(LockedOperation::Force));
    }

    #[test]
    fn test_cache_with_search_condition_rejected_at_load() {
        let import = format!("{IMPORT}ORDERS.cache-id=orders\n");
        let err = loader(&import, "").load_import_specs("t", "b", "j", true).unwrap_err();
        assert!(matches!(err, ParamError::Invalid { ref attribute, .. } if attribute == ATTR_SEARCH_CONDITION));
    }

    const EXPORT: &str = "\
export.target-table=ORDERS
ORDERS.tsv-column=ID,AMOUNT
ORDERS.export-table-column=ID,AMOUNT,SID
ORDERS.error-table=ORDERS_ERR
ORDERS.error-table-column=ID,AMOUNT
ORDERS.key-column=ID
ORDERS.error-column=ERR_CODE
ORDERS.error-code=E01
ORDERS.bean-name=Orders
ORDERS.hdfs-export-file=/${user}/${execution_id}/export/a,/${user}/${execution_id}/export/b
";

    #[test]
    fn test_load_export_specs() {
        let specs = loader("", EXPORT).load_export_specs("t", "b", "j").unwrap();
        let orders = &specs["ORDERS"];
        assert!(orders.is_duplicate_check());
        assert_eq!(orders.dfs_paths.len(), 2);
        assert_eq!(orders.error_code.as_deref(), Some("E01"));
    }

    #[test]
    fn test_export_duplicate_check_requires_error_column() {
        let export = EXPORT.replace("ORDERS.error-column=ERR_CODE\n", "ORDERS.error-column=\n");
        let err = loader("", &export).load_export_specs("t", "b", "j").unwrap_err();
        assert!(matches!(err, ParamError::Invalid { ref attribute, .. } if attribute == crate::params::ATTR_ERROR_COLUMN));
    }

    #[test]
    fn test_recovery_ignores_export_paths() {
        let export = EXPORT.replace("ORDERS.hdfs-export-file", "ORDERS.unused");
        let specs = loader(IMPORT, &export).load_recovery_specs("t", "b", "j").unwrap();
        assert_eq!(specs.exports.len(), 1);
        assert_eq!(specs.imports.len(), 2);
    }
}
