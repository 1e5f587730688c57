//! Jobflow execution lock
//!
//! Holding the lock means holding an open, uncommitted transaction on a
//! dedicated connection in which a row keyed by the execution id has been
//! inserted into `jobflow_instance_lock`. The unique key on that column is
//! the whole exclusion mechanism: a second inserter conflicts with the
//! uncommitted row and fails once `lock_timeout` expires.
//!
//! The transaction is never committed. Releasing rolls it back and closes
//! the connection, so the row never becomes visible to anyone else.

use async_trait::async_trait;
use sqlx::{Connection, Executor, PgConnection};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock connection is already closed")]
    Closed,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A connection reserved for the execution lock
#[async_trait]
pub trait LockConnection: Send {
    /// Start a read-committed transaction whose lock waits are bounded
    async fn begin(&mut self, lock_timeout: Duration) -> Result<(), LockError>;

    async fn insert_lock(&mut self, execution_id: &str) -> Result<(), LockError>;

    async fn rollback(&mut self) -> Result<(), LockError>;

    async fn close(&mut self) -> Result<(), LockError>;
}

/// Postgres lock connection
pub struct PgLockConnection {
    conn: Option<PgConnection>,
}

impl PgLockConnection {
    pub async fn connect(database_url: &str) -> Result<Self, LockError> {
        let conn = PgConnection::connect(database_url).await?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn: Some(conn) }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&mut self) -> Result<&mut PgConnection, LockError> {
        self.conn.as_mut().ok_or(LockError::Closed)
    }
}

/// `SET` does not take bind parameters. Zero would disable the timeout, so
/// anything below a millisecond is rounded up.
fn lock_timeout_statement(lock_timeout: Duration) -> String {
    format!("SET LOCAL lock_timeout = '{}ms'", lock_timeout.as_millis().max(1))
}

#[async_trait]
impl LockConnection for PgLockConnection {
    async fn begin(&mut self, lock_timeout: Duration) -> Result<(), LockError> {
        let conn = self.conn()?;
        let statement = lock_timeout_statement(lock_timeout);
        conn.execute(sqlx::raw_sql("BEGIN ISOLATION LEVEL READ COMMITTED"))
            .await?;
        conn.execute(sqlx::raw_sql(&statement)).await?;
        Ok(())
    }

    async fn insert_lock(&mut self, execution_id: &str) -> Result<(), LockError> {
        let conn = self.conn()?;
        sqlx::query("INSERT INTO jobflow_instance_lock (execution_id) VALUES ($1)")
            .bind(execution_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LockError> {
        let conn = self.conn()?;
        conn.execute(sqlx::raw_sql("ROLLBACK")).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LockError> {
        match self.conn.take() {
            Some(conn) => Ok(conn.close().await?),
            None => Ok(()),
        }
    }
}

/// Acquires and releases the jobflow execution lock
#[derive(Debug, Clone, Copy)]
pub struct LockCoordinator {
    lock_timeout: Duration,
}

impl LockCoordinator {
    pub fn new(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }

    /// Try to take the lock for `execution_id` on `conn`.
    ///
    /// Returns `false` on any failure, including another holder. The
    /// transaction is rolled back in that case and the connection stays open.
    pub async fn acquire<C>(&self, execution_id: &str, conn: &mut C) -> bool
    where
        C: LockConnection + ?Sized,
    {
        if let Err(e) = conn.begin(self.lock_timeout).await {
            warn!(execution_id, error = %e, "Failed to start lock transaction");
            rollback_quietly(conn, execution_id).await;
            return false;
        }

        match conn.insert_lock(execution_id).await {
            Ok(()) => {
                info!(execution_id, "Acquired jobflow execution lock");
                true
            },
            Err(e) => {
                info!(execution_id, error = %e, "Jobflow execution lock is held elsewhere");
                rollback_quietly(conn, execution_id).await;
                false
            },
        }
    }

    /// Give the lock back: roll back, then close even if the rollback failed
    pub async fn release<C>(&self, mut conn: C)
    where
        C: LockConnection,
    {
        if let Err(e) = conn.rollback().await {
            warn!(error = %e, "Failed to roll back lock transaction");
        }
        match conn.close().await {
            Ok(()) => debug!("Closed lock connection"),
            Err(e) => warn!(error = %e, "Failed to close lock connection"),
        }
    }
}

async fn rollback_quietly<C>(conn: &mut C, execution_id: &str)
where
    C: LockConnection + ?Sized,
{
    if let Err(e) = conn.rollback().await {
        warn!(execution_id, error = %e, "Failed to roll back after lock failure");
    }
}
