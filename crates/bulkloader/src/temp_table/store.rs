//! Persistence of export staging rows in `export_temp_table`

use super::state::{check_transition, TempTableRecord};
use crate::naming::PathNamingService;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bulkloader_common::types::TempTableStatus;
use regex::Regex;
use sqlx::PgPool;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

#[allow(clippy::unwrap_used)]
static SQL_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[async_trait]
pub trait TempTableStore: Send + Sync {
    /// Insert the staging row of `export_table` and name its temp and flag tables
    async fn register(&self, jobflow_sid: i64, export_table: &str) -> Result<TempTableRecord>;

    async fn list(&self, jobflow_sid: i64) -> Result<Vec<TempTableRecord>>;

    /// Move one row forward; rejects backward or repeated transitions
    async fn advance(&self, jobflow_sid: i64, export_table: &str, next: TempTableStatus) -> Result<()>;

    /// Move every `LOAD_EXIT` row of the jobflow to `BEFORE_COPY`, returning how many moved
    async fn mark_loaded_before_copy(&self, jobflow_sid: i64) -> Result<u64>;

    /// Create the duplicate-flag table keyed by the temporary id
    async fn create_flag_table(&self, record: &TempTableRecord) -> Result<()>;

    /// Drop the temp and flag tables and delete the staging row
    async fn discard(&self, record: &TempTableRecord) -> Result<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct TempTableRow {
    jobflow_sid: i64,
    table_name: String,
    export_temp_name: Option<String>,
    duplicate_flg_name: Option<String>,
    temp_table_status: Option<String>,
}

impl TryFrom<TempTableRow> for TempTableRecord {
    type Error = anyhow::Error;

    fn try_from(row: TempTableRow) -> Result<Self> {
        let status = decode_status(&row.table_name, row.temp_table_status.as_deref())?;
        Ok(Self {
            jobflow_sid: row.jobflow_sid,
            export_table: row.table_name,
            temp_table: row.export_temp_name,
            duplicate_flag_table: row.duplicate_flg_name,
            status,
        })
    }
}

/// A blank column means no status yet; any other unknown code is corrupt
fn decode_status(export_table: &str, raw: Option<&str>) -> Result<Option<TempTableStatus>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(code) => TempTableStatus::find(code)
            .map(Some)
            .with_context(|| format!("Unknown temp table status {code:?} for {export_table}")),
    }
}

/// Postgres-backed staging rows
pub struct PgTempTableStore {
    pool: Arc<PgPool>,
    naming: Arc<dyn PathNamingService>,
    temp_sid_column: String,
}

impl PgTempTableStore {
    pub fn new(pool: Arc<PgPool>, naming: Arc<dyn PathNamingService>, temp_sid_column: impl Into<String>) -> Self {
        Self {
            pool,
            naming,
            temp_sid_column: temp_sid_column.into(),
        }
    }
}

#[async_trait]
impl TempTableStore for PgTempTableStore {
    async fn register(&self, jobflow_sid: i64, export_table: &str) -> Result<TempTableRecord> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO export_temp_table (jobflow_sid, table_name)
            VALUES ($1, $2)
            RETURNING export_temp_seq
            "#,
        )
        .bind(jobflow_sid)
        .bind(export_table)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert export temp table row")?;

        let temp_table = self.naming.temp_table_name(export_table, seq);
        let flag_table = self.naming.duplicate_flag_table_name(&temp_table);

        sqlx::query(
            r#"
            UPDATE export_temp_table
            SET export_temp_name = $1, duplicate_flg_name = $2
            WHERE jobflow_sid = $3 AND table_name = $4
            "#,
        )
        .bind(&temp_table)
        .bind(&flag_table)
        .bind(jobflow_sid)
        .bind(export_table)
        .execute(&mut *tx)
        .await
        .context("Failed to name export temp tables")?;

        tx.commit().await.context("Failed to commit transaction")?;

        debug!(jobflow_sid, export_table, temp_table = %temp_table, "Registered export temp table");
        Ok(TempTableRecord {
            jobflow_sid,
            export_table: export_table.to_string(),
            temp_table: Some(temp_table),
            duplicate_flag_table: Some(flag_table),
            status: None,
        })
    }

    async fn list(&self, jobflow_sid: i64) -> Result<Vec<TempTableRecord>> {
        let rows = sqlx::query_as::<_, TempTableRow>(
            r#"
            SELECT jobflow_sid, table_name, export_temp_name, duplicate_flg_name, temp_table_status
            FROM export_temp_table
            WHERE jobflow_sid = $1
            ORDER BY export_temp_seq
            "#,
        )
        .bind(jobflow_sid)
        .fetch_all(&*self.pool)
        .await
        .context("Failed to list export temp tables")?;

        rows.into_iter().map(TempTableRecord::try_from).collect()
    }

    async fn advance(&self, jobflow_sid: i64, export_table: &str, next: TempTableStatus) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let current: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT temp_table_status
            FROM export_temp_table
            WHERE jobflow_sid = $1 AND table_name = $2
            FOR UPDATE
            "#,
        )
        .bind(jobflow_sid)
        .bind(export_table)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read export temp table status")?;

        let Some(current) = current else {
            bail!("No export temp table row for {export_table} (jobflow {jobflow_sid})");
        };
        let current = decode_status(export_table, current.as_deref())?;
        check_transition(export_table, current, next)?;

        sqlx::query(
            r#"
            UPDATE export_temp_table
            SET temp_table_status = $1
            WHERE jobflow_sid = $2 AND table_name = $3
            "#,
        )
        .bind(next.code())
        .bind(jobflow_sid)
        .bind(export_table)
        .execute(&mut *tx)
        .await
        .context("Failed to update export temp table status")?;

        tx.commit().await.context("Failed to commit transaction")?;

        info!(jobflow_sid, export_table, status = %next, "Advanced export temp table");
        Ok(())
    }

    async fn mark_loaded_before_copy(&self, jobflow_sid: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE export_temp_table
            SET temp_table_status = $1
            WHERE jobflow_sid = $2 AND temp_table_status = $3
            "#,
        )
        .bind(TempTableStatus::BeforeCopy.code())
        .bind(jobflow_sid)
        .bind(TempTableStatus::LoadExit.code())
        .execute(&*self.pool)
        .await
        .context("Failed to mark export temp tables before copy")?;

        Ok(result.rows_affected())
    }

    async fn create_flag_table(&self, record: &TempTableRecord) -> Result<()> {
        let table = identifier(record.duplicate_flag_table.as_deref(), "duplicate flag table")?;
        let column = identifier(Some(&self.temp_sid_column), "temporary id column")?;

        let sql = format!("CREATE TABLE {table} ({column} BIGINT NOT NULL, PRIMARY KEY ({column}))");
        sqlx::query(&sql)
            .execute(&*self.pool)
            .await
            .with_context(|| format!("Failed to create duplicate flag table {table}"))?;

        debug!(table, "Created duplicate flag table");
        Ok(())
    }

    async fn discard(&self, record: &TempTableRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let tables = [record.temp_table.as_deref(), record.duplicate_flag_table.as_deref()];
        for table in tables.into_iter().flatten() {
            let table = identifier(Some(table), "temp table")?;
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to drop {table}"))?;
        }

        sqlx::query("DELETE FROM export_temp_table WHERE jobflow_sid = $1 AND table_name = $2")
            .bind(record.jobflow_sid)
            .bind(&record.export_table)
            .execute(&mut *tx)
            .await
            .context("Failed to delete export temp table row")?;

        tx.commit().await.context("Failed to commit transaction")?;

        info!(
            jobflow_sid = record.jobflow_sid,
            export_table = %record.export_table,
            "Discarded export temp tables"
        );
        Ok(())
    }
}

/// Table and column names cannot be bound, so only plain identifiers are spliced in
fn identifier<'a>(name: Option<&'a str>, what: &str) -> Result<&'a str> {
    match name {
        Some(name) if SQL_IDENTIFIER.is_match(name) => Ok(name),
        Some(name) => bail!("Invalid {what} name {name:?}"),
        None => bail!("Missing {what} name"),
    }
}
