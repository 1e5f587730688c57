//! Where jobflow properties and record types come from

use super::spec::RecordType;
use super::ParamError;
use crate::properties::{read_properties, Properties};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Import,
    Export,
}

impl Direction {
    fn file_suffix(&self) -> &'static str {
        match self {
            Direction::Import => "import.properties",
            Direction::Export => "export.properties",
        }
    }
}

/// Supplies the raw properties of a jobflow for one direction
pub trait JobflowPropertySource: Send + Sync {
    /// An absent property set means the jobflow has no tables in that direction
    fn read(&self, direction: Direction, target: &str, batch_id: &str, jobflow_id: &str)
        -> Result<Properties, ParamError>;
}

/// Reads `<target>.import.properties` / `<target>.export.properties` from
/// `<batchapps>/<batch_id>/lib/jobflow-<jobflow_id>/`
#[derive(Debug, Clone)]
pub struct FileJobflowPropertySource {
    batchapps_home: PathBuf,
}

impl FileJobflowPropertySource {
    pub fn new(batchapps_home: impl Into<PathBuf>) -> Self {
        Self {
            batchapps_home: batchapps_home.into(),
        }
    }

    pub fn jobflow_dir(&self, batch_id: &str, jobflow_id: &str) -> PathBuf {
        self.batchapps_home
            .join(batch_id)
            .join("lib")
            .join(format!("jobflow-{jobflow_id}"))
    }

    pub fn properties_path(&self, direction: Direction, target: &str, batch_id: &str, jobflow_id: &str) -> PathBuf {
        self.jobflow_dir(batch_id, jobflow_id)
            .join(format!("{target}.{}", direction.file_suffix()))
    }
}

impl JobflowPropertySource for FileJobflowPropertySource {
    fn read(
        &self,
        direction: Direction,
        target: &str,
        batch_id: &str,
        jobflow_id: &str,
    ) -> Result<Properties, ParamError> {
        let path = self.properties_path(direction, target, batch_id, jobflow_id);
        if !path.exists() {
            debug!(path = %path.display(), "No jobflow properties, no tables");
            return Ok(Properties::new());
        }
        read_file(&path)
    }
}

fn read_file(path: &Path) -> Result<Properties, ParamError> {
    read_properties(path).map_err(|source| ParamError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves `bean-name` values
pub trait RecordTypeRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<RecordType>;
}

/// Registry over a fixed set of record types
#[derive(Debug, Clone, Default)]
pub struct StaticRecordTypeRegistry {
    types: BTreeMap<String, RecordType>,
}

impl StaticRecordTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, name: impl Into<String>, supports_cache: bool) -> Self {
        let record_type = RecordType::new(name, supports_cache);
        self.types.insert(record_type.name.clone(), record_type);
        self
    }
}

impl RecordTypeRegistry for StaticRecordTypeRegistry {
    fn resolve(&self, name: &str) -> Option<RecordType> {
        self.types.get(name).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_path_layout() {
        let source = FileJobflowPropertySource::new("/opt/batchapps");
        assert_eq!(
            source.properties_path(Direction::Export, "target1", "batch01", "JBF01"),
            PathBuf::from("/opt/batchapps/batch01/lib/jobflow-JBF01/target1.export.properties")
        );
    }

    #[test]
    fn test_missing_file_means_no_tables() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileJobflowPropertySource::new(dir.path());
        let props = source.read(Direction::Import, "target1", "batch01", "JBF01").unwrap();
        assert!(props.is_empty());
    }

    #[test]
    fn test_registry_resolves_known_names() {
        let registry = StaticRecordTypeRegistry::new().with_type("Orders", true);
        assert_eq!(registry.resolve("Orders"), Some(RecordType::new("Orders", true)));
        assert_eq!(registry.resolve("Missing"), None);
    }
}
