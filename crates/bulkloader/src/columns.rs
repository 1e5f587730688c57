//! System column names shared by every export table

/// Default name of the system id column
pub const DEFAULT_SID_COLUMN: &str = "SID";
/// Default name of the optimistic version column
pub const DEFAULT_VERSION_NO_COLUMN: &str = "VERSION_NO";
/// Default name of the registration timestamp column
pub const DEFAULT_RGST_DATETIME_COLUMN: &str = "RGST_DATETIME";
/// Default name of the update timestamp column
pub const DEFAULT_UPDT_DATETIME_COLUMN: &str = "UPDT_DATETIME";
/// Default name of the temporary id column carried by staging tables
pub const DEFAULT_TEMP_SID_COLUMN: &str = "__TEMP_SID";

/// System column names, fixed once the configuration is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemColumns {
    pub sid: String,
    pub version_no: String,
    pub rgst_datetime: String,
    pub updt_datetime: String,
    pub temp_sid: String,
}

impl Default for SystemColumns {
    fn default() -> Self {
        Self {
            sid: DEFAULT_SID_COLUMN.to_string(),
            version_no: DEFAULT_VERSION_NO_COLUMN.to_string(),
            rgst_datetime: DEFAULT_RGST_DATETIME_COLUMN.to_string(),
            updt_datetime: DEFAULT_UPDT_DATETIME_COLUMN.to_string(),
            temp_sid: DEFAULT_TEMP_SID_COLUMN.to_string(),
        }
    }
}

impl SystemColumns {
    /// The four columns maintained by the bulkloader on export tables.
    /// The temporary id is not one of them.
    pub fn names(&self) -> [&str; 4] {
        [
            self.sid.as_str(),
            self.version_no.as_str(),
            self.rgst_datetime.as_str(),
            self.updt_datetime.as_str(),
        ]
    }

    pub fn is_system(&self, column: &str) -> bool {
        self.names().contains(&column)
    }

    /// Remove system columns, keeping order
    pub fn strip(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| !self.is_system(c))
            .cloned()
            .collect()
    }

    /// Remove system columns and the error-code column from an error-table
    /// column list, dropping repeated names
    pub fn strip_with_error_code(&self, columns: &[String], error_code_column: &str) -> Vec<String> {
        let mut kept: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if self.is_system(column) || column == error_code_column || kept.contains(column) {
                continue;
            }
            kept.push(column.clone());
        }
        kept
    }

    pub fn join(columns: &[String]) -> String {
        columns.join(",")
    }
}
