//! Registry of jobflow instances currently importing or exporting
//!
//! A row lives in `running_jobflows` from the start of an import until its
//! export finishes. Recovery walks these rows to find abandoned instances.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RunningJobflow {
    pub jobflow_sid: i64,
    pub batch_id: String,
    pub jobflow_id: String,
    pub target_name: String,
    pub execution_id: String,
    pub expected_completion: Option<DateTime<Utc>>,
}

/// Fields supplied when an instance starts
#[derive(Debug, Clone)]
pub struct NewRunningJobflow<'a> {
    pub batch_id: &'a str,
    pub jobflow_id: &'a str,
    pub target_name: &'a str,
    pub execution_id: &'a str,
    pub expected_completion: Option<DateTime<Utc>>,
}

pub struct RunningJobflowRegistry {
    pool: Arc<PgPool>,
}

impl RunningJobflowRegistry {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Register a starting instance and return its jobflow sid
    pub async fn register(&self, jobflow: NewRunningJobflow<'_>) -> Result<i64> {
        let sid: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO running_jobflows (
                batch_id, jobflow_id, target_name, execution_id, expected_completion
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING jobflow_sid
            "#,
        )
        .bind(jobflow.batch_id)
        .bind(jobflow.jobflow_id)
        .bind(jobflow.target_name)
        .bind(jobflow.execution_id)
        .bind(jobflow.expected_completion)
        .fetch_one(&*self.pool)
        .await
        .context("Failed to register running jobflow")?;

        info!(
            jobflow_sid = sid,
            execution_id = jobflow.execution_id,
            target_name = jobflow.target_name,
            "Registered running jobflow"
        );
        Ok(sid)
    }

    pub async fn find_sid(&self, execution_id: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT jobflow_sid FROM running_jobflows WHERE execution_id = $1")
            .bind(execution_id)
            .fetch_optional(&*self.pool)
            .await
            .context("Failed to look up running jobflow")
    }

    /// Running instances ordered by sid, optionally only those of one execution
    pub async fn list(&self, execution_id: Option<&str>) -> Result<Vec<RunningJobflow>> {
        let rows = sqlx::query_as::<_, RunningJobflow>(
            r#"
            SELECT jobflow_sid, batch_id, jobflow_id, target_name, execution_id, expected_completion
            FROM running_jobflows
            WHERE $1::text IS NULL OR execution_id = $1
            ORDER BY jobflow_sid
            "#,
        )
        .bind(execution_id)
        .fetch_all(&*self.pool)
        .await
        .context("Failed to list running jobflows")?;

        debug!(count = rows.len(), "Listed running jobflows");
        Ok(rows)
    }

    /// Returns whether a row was removed
    pub async fn remove(&self, jobflow_sid: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM running_jobflows WHERE jobflow_sid = $1")
            .bind(jobflow_sid)
            .execute(&*self.pool)
            .await
            .context("Failed to remove running jobflow")?;

        Ok(result.rows_affected() > 0)
    }
}
