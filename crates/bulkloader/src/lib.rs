//! Bulkloader Library
//!
//! Moves table data between the database and the distributed filesystem for
//! scheduled jobflow executions.
//!
//! # Overview
//!
//! - **Configuration**: `BulkloaderConfig` built once from a `ConfigProvider`
//! - **Parameters**: `ParameterLoader` turns jobflow properties into validated
//!   `TableImportSpec` / `TableExportSpec` sets
//! - **Locking**: `LockCoordinator` holds the per-execution lock as an open,
//!   never committed transaction
//! - **Copying**: `copier::copy` streams records through a bounded buffer pool
//!   on two threads; `tsv` adapts staging files to it
//! - **Export staging**: `temp_table` tracks temp tables so an export can be
//!   resumed or rolled back
//! - **Retry**: `RetryPolicy` re-runs transfer subprocesses on retryable exits
//!
//! # Architecture
//!
//! A scheduler drives one jobflow execution roughly as follows:
//!
//! 1. load specs with `ParameterLoader`
//! 2. acquire the execution lock with `LockCoordinator`
//! 3. move each table with the copier, wrapping subprocess steps in `RetryPolicy`
//! 4. on export, record staging progress through `TempTableStore`
//! 5. release the lock
//!
//! # Example
//!
//! ```no_run
//! use bulkloader::config::BulkloaderConfig;
//! use bulkloader::lock::{LockCoordinator, PgLockConnection};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = BulkloaderConfig::from_env()?;
//! let coordinator = LockCoordinator::new(config.lock_timeout);
//!
//! let mut conn = PgLockConnection::connect(config.require_database_url()?).await?;
//! if coordinator.acquire("EXE01", &mut conn).await {
//!     // import or export here
//!     coordinator.release(conn).await;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod columns;
pub mod config;
pub mod copier;
pub mod lock;
pub mod naming;
pub mod params;
pub mod properties;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod temp_table;
pub mod tsv;

// Re-export commonly used types
pub use columns::SystemColumns;
pub use config::{BulkloaderConfig, ConfigError, ConfigProvider, PropertiesConfigProvider};
pub use copier::{copy, CopyError, RecordSink, RecordSource};
pub use lock::{LockConnection, LockCoordinator, LockError, PgLockConnection};
pub use naming::{DefaultPathNaming, PathNamingService};
pub use params::{ParamError, ParameterLoader, TableExportSpec, TableImportSpec};
pub use registry::RunningJobflowRegistry;
pub use retry::{RetryPolicy, RetrySettings};
pub use temp_table::{PgTempTableStore, TempTableRecord, TempTableStore};
