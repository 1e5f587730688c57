//! Bulkloader configuration
//!
//! Configuration is read once from a [`ConfigProvider`] into a
//! [`BulkloaderConfig`] that is then passed explicitly to the components that
//! need it. Nothing here is stored in process-wide state.

use crate::columns::SystemColumns;
use crate::properties::{read_properties, Properties};
use crate::retry::{RetrySettings, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_INTERVAL_SECS};
use bulkloader_common::{VariableError, VariableTable};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Install root of the batch framework
pub const ENV_ASAKUSA_HOME: &str = "ASAKUSA_HOME";
/// Root directory of deployed batch applications
pub const ENV_BATCHAPPS_HOME: &str = "ASAKUSA_BATCHAPPS_HOME";
/// Bulkloader installation directory, holds `conf/`
pub const ENV_BULKLOADER_HOME: &str = "BULKLOADER_HOME";
/// Serialized variable table passed by the caller
pub const ENV_BULKLOADER_ARGS: &str = "BULKLOADER_ARGS";
/// Name of the invoking user
pub const ENV_USER: &str = "USER";
/// Database URL fallback when `database.url` is not set
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Variable holding the invoking user name
pub const VAR_CALLER: &str = "__caller__";

/// Database configuration file relative to `BULKLOADER_HOME`
pub const DB_CONFIG_FILE: &str = "conf/bulkloader-conf-db.properties";

/// Default maximum number of records copied per export statement
pub const DEFAULT_DATA_COPY_MAX_COUNT: u64 = 100_000;

/// Default upper bound for one export TSV file, in bytes
pub const DEFAULT_TSV_MAX_SIZE: u64 = 16_777_216;

/// Default bound on waiting for the jobflow execution lock, in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MILLIS: u64 = 100;

/// Default for deleting TSV files after a successful run
pub const DEFAULT_DELETE_TSV: bool = true;

pub const KEY_IMPORT_RETRY_COUNT: &str = "import.retry-count";
pub const KEY_IMPORT_RETRY_INTERVAL: &str = "import.retry-interval";
pub const KEY_EXPORT_RETRY_COUNT: &str = "export.retry-count";
pub const KEY_EXPORT_RETRY_INTERVAL: &str = "export.retry-interval";
pub const KEY_DATA_COPY_MAX_COUNT: &str = "export.data-copy-max-count";
pub const KEY_TSV_MAX_SIZE: &str = "export.tsv-max-size";
pub const KEY_IMPORT_TSV_DIR: &str = "import.tsv-create-dir";
pub const KEY_EXPORT_TSV_DIR: &str = "export.tsv-create-dir";
pub const KEY_IMPORT_DELETE_TSV: &str = "import.delete-tsv";
pub const KEY_EXPORT_DELETE_TSV: &str = "export.delete-tsv";
pub const KEY_SYS_COLUMN_SID: &str = "table.sys-column-sid";
pub const KEY_SYS_COLUMN_VERSION_NO: &str = "table.sys-column-version-no";
pub const KEY_SYS_COLUMN_RGST_DATE: &str = "table.sys-column-rgst-date";
pub const KEY_SYS_COLUMN_UPDT_DATE: &str = "table.sys-column-updt-date";
pub const KEY_SYS_COLUMN_TEMP_SID: &str = "table.sys-column-temp-sid";
pub const KEY_DATABASE_URL: &str = "database.url";
pub const KEY_LOCK_TIMEOUT: &str = "database.lock-timeout-millis";
pub const KEY_DFS_PROTOCOL_HOST: &str = "hdfs-protocol-host";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("required setting is missing: {0}")]
    Missing(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid BULKLOADER_ARGS: {0}")]
    Variables(#[from] VariableError),
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Source of configuration properties and environment variables
pub trait ConfigProvider: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
    fn env(&self, name: &str) -> Option<String>;
}

/// Properties file plus an environment snapshot
#[derive(Debug, Clone, Default)]
pub struct PropertiesConfigProvider {
    properties: Properties,
    env: BTreeMap<String, String>,
}

impl PropertiesConfigProvider {
    /// Empty provider, mostly useful in tests together with the `with_*` builders
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.env`, snapshot the environment and read the database
    /// configuration file under `BULKLOADER_HOME` when it exists
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env: BTreeMap<String, String> = std::env::vars().collect();
        let mut provider = Self {
            properties: Properties::new(),
            env,
        };

        if let Some(home) = provider.env(ENV_BULKLOADER_HOME) {
            let path = Path::new(&home).join(DB_CONFIG_FILE);
            if path.is_file() {
                provider = provider.with_properties_file(&path)?;
            } else {
                debug!(path = %path.display(), "No database configuration file");
            }
        }

        Ok(provider)
    }

    /// Merge properties from a file; later files win on duplicate keys
    pub fn with_properties_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        let properties = read_properties(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), count = properties.len(), "Loaded configuration properties");
        self.properties.extend(properties);
        Ok(self)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }
}

impl ConfigProvider for PropertiesConfigProvider {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }

    fn env(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }
}

/// Validated configuration context
#[derive(Debug, Clone)]
pub struct BulkloaderConfig {
    pub system_columns: SystemColumns,
    pub import_retry: RetrySettings,
    pub export_retry: RetrySettings,
    pub data_copy_max_count: u64,
    pub tsv_max_size: u64,
    pub import_tsv_dir: Option<PathBuf>,
    pub export_tsv_dir: Option<PathBuf>,
    pub delete_import_tsv: bool,
    pub delete_export_tsv: bool,
    pub database_url: Option<String>,
    pub lock_timeout: Duration,
    pub batchapps_home: Option<PathBuf>,
    /// `scheme://host:port` prefix of distributed filesystem paths
    pub dfs_protocol_host: String,
    pub variables: VariableTable,
}

impl Default for BulkloaderConfig {
    fn default() -> Self {
        Self {
            system_columns: SystemColumns::default(),
            import_retry: RetrySettings::default(),
            export_retry: RetrySettings::default(),
            data_copy_max_count: DEFAULT_DATA_COPY_MAX_COUNT,
            tsv_max_size: DEFAULT_TSV_MAX_SIZE,
            import_tsv_dir: None,
            export_tsv_dir: None,
            delete_import_tsv: DEFAULT_DELETE_TSV,
            delete_export_tsv: DEFAULT_DELETE_TSV,
            database_url: None,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MILLIS),
            batchapps_home: None,
            dfs_protocol_host: String::new(),
            variables: VariableTable::new(),
        }
    }
}

impl BulkloaderConfig {
    /// Build the configuration context from a provider
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        let defaults = SystemColumns::default();
        let system_columns = SystemColumns {
            sid: string_or(provider, KEY_SYS_COLUMN_SID, &defaults.sid),
            version_no: string_or(provider, KEY_SYS_COLUMN_VERSION_NO, &defaults.version_no),
            rgst_datetime: string_or(provider, KEY_SYS_COLUMN_RGST_DATE, &defaults.rgst_datetime),
            updt_datetime: string_or(provider, KEY_SYS_COLUMN_UPDT_DATE, &defaults.updt_datetime),
            temp_sid: string_or(provider, KEY_SYS_COLUMN_TEMP_SID, &defaults.temp_sid),
        };

        let config = Self {
            system_columns,
            import_retry: retry_settings(provider, KEY_IMPORT_RETRY_COUNT, KEY_IMPORT_RETRY_INTERVAL)?,
            export_retry: retry_settings(provider, KEY_EXPORT_RETRY_COUNT, KEY_EXPORT_RETRY_INTERVAL)?,
            data_copy_max_count: number_or(provider, KEY_DATA_COPY_MAX_COUNT, DEFAULT_DATA_COPY_MAX_COUNT)?,
            tsv_max_size: number_or(provider, KEY_TSV_MAX_SIZE, DEFAULT_TSV_MAX_SIZE)?,
            import_tsv_dir: non_blank(provider.property(KEY_IMPORT_TSV_DIR)).map(PathBuf::from),
            export_tsv_dir: non_blank(provider.property(KEY_EXPORT_TSV_DIR)).map(PathBuf::from),
            delete_import_tsv: delete_flag(provider, KEY_IMPORT_DELETE_TSV)?,
            delete_export_tsv: delete_flag(provider, KEY_EXPORT_DELETE_TSV)?,
            database_url: non_blank(provider.property(KEY_DATABASE_URL))
                .or_else(|| non_blank(provider.env(ENV_DATABASE_URL))),
            lock_timeout: Duration::from_millis(number_or(
                provider,
                KEY_LOCK_TIMEOUT,
                DEFAULT_LOCK_TIMEOUT_MILLIS,
            )?),
            batchapps_home: batchapps_home(provider),
            dfs_protocol_host: non_blank(provider.property(KEY_DFS_PROTOCOL_HOST)).unwrap_or_default(),
            variables: variables_from_env(provider)?,
        };

        config.validate()?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Load `.env` and the process environment, then build the context
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = PropertiesConfigProvider::load()?;
        Self::from_provider(&provider)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let columns = &self.system_columns;
        for (key, value) in [
            (KEY_SYS_COLUMN_SID, &columns.sid),
            (KEY_SYS_COLUMN_VERSION_NO, &columns.version_no),
            (KEY_SYS_COLUMN_RGST_DATE, &columns.rgst_datetime),
            (KEY_SYS_COLUMN_UPDT_DATE, &columns.updt_datetime),
            (KEY_SYS_COLUMN_TEMP_SID, &columns.temp_sid),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(key, value, "column name must not be blank"));
            }
        }

        if self.data_copy_max_count < 1 {
            return Err(ConfigError::invalid(
                KEY_DATA_COPY_MAX_COUNT,
                &self.data_copy_max_count.to_string(),
                "must be at least 1",
            ));
        }
        if self.tsv_max_size < 1 {
            return Err(ConfigError::invalid(
                KEY_TSV_MAX_SIZE,
                &self.tsv_max_size.to_string(),
                "must be at least 1",
            ));
        }
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::invalid(
                KEY_LOCK_TIMEOUT,
                &self.lock_timeout.as_millis().to_string(),
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Database URL, required by everything that touches the database
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing(format!("{KEY_DATABASE_URL} or {ENV_DATABASE_URL}")))
    }

    pub fn require_batchapps_home(&self) -> Result<&Path, ConfigError> {
        self.batchapps_home
            .as_deref()
            .ok_or_else(|| ConfigError::Missing(format!("{ENV_BATCHAPPS_HOME} or {ENV_ASAKUSA_HOME}")))
    }
}

/// Variable table seeded from the environment
///
/// `__caller__` is set from `USER`, then the pairs in `BULKLOADER_ARGS`
/// are applied on top, so the caller may override it.
pub fn variables_from_env(provider: &dyn ConfigProvider) -> Result<VariableTable, ConfigError> {
    let mut variables = VariableTable::new();
    if let Some(user) = provider.env(ENV_USER) {
        variables.define(VAR_CALLER, user);
    }
    if let Some(args) = provider.env(ENV_BULKLOADER_ARGS) {
        variables.define_serialized(&args)?;
    }
    Ok(variables)
}

/// `ASAKUSA_BATCHAPPS_HOME`, else `ASAKUSA_HOME/batchapps`
pub fn batchapps_home(provider: &dyn ConfigProvider) -> Option<PathBuf> {
    non_blank(provider.env(ENV_BATCHAPPS_HOME))
        .map(PathBuf::from)
        .or_else(|| non_blank(provider.env(ENV_ASAKUSA_HOME)).map(|home| Path::new(&home).join("batchapps")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn string_or(provider: &dyn ConfigProvider, key: &str, default: &str) -> String {
    non_blank(provider.property(key)).unwrap_or_else(|| default.to_string())
}

fn number_or(provider: &dyn ConfigProvider, key: &str, default: u64) -> Result<u64, ConfigError> {
    match non_blank(provider.property(key)) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::invalid(key, &raw, "must be a non-negative integer")),
    }
}

fn retry_settings(
    provider: &dyn ConfigProvider,
    count_key: &str,
    interval_key: &str,
) -> Result<RetrySettings, ConfigError> {
    let count = number_or(provider, count_key, u64::from(DEFAULT_RETRY_COUNT))?;
    let count = u32::try_from(count).map_err(|_| ConfigError::invalid(count_key, &count.to_string(), "out of range"))?;
    let interval = number_or(provider, interval_key, DEFAULT_RETRY_INTERVAL_SECS)?;
    Ok(RetrySettings::new(count, Duration::from_secs(interval)))
}

/// `1` deletes, `0` keeps
fn delete_flag(provider: &dyn ConfigProvider, key: &str) -> Result<bool, ConfigError> {
    match non_blank(provider.property(key)).as_deref() {
        None => Ok(DEFAULT_DELETE_TSV),
        Some("1") => Ok(true),
        Some("0") => Ok(false),
        Some(other) => Err(ConfigError::invalid(key, other, "must be 0 or 1")),
    }
}
