//! PostgreSQL remote sink
//!
//! Stores application errors in the `server_logs` table. Infrastructure
//! errors never arrive here; the logger routes them locally.
//!
//! # Example
//!
//! ```ignore
//! let sink = PostgresLogSink::connect(&database_url).await?;
//! sink.run_migrations().await?;
//!
//! // Retention
//! let report = sink.cleanup_older_than(7, true).await?;
//! println!("{} entries older than {}", report.matched, report.cutoff);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logshield_domain::{LogEntry, LogSink, SinkError, SinkKind};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::info;

pub const TABLE: &str = "server_logs";

#[derive(Debug, Error)]
pub enum PostgresSinkError {
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Failed to encode entry metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Retention must be at least one day, got {0}")]
    InvalidRetention(u32),
}

impl From<PostgresSinkError> for SinkError {
    fn from(err: PostgresSinkError) -> Self {
        match err {
            PostgresSinkError::Metadata(e) => SinkError::Serialization(e),
            other => SinkError::Remote(other.to_string()),
        }
    }
}

/// Result of a retention pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub cutoff: DateTime<Utc>,
    /// Rows older than the cutoff
    pub matched: u64,
    /// Rows removed; zero on a dry run
    pub deleted: u64,
    pub dry_run: bool,
}

pub struct PostgresLogSink {
    pool: PgPool,
}

impl PostgresLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool; log writes are short and infrequent
    pub async fn connect(url: &str) -> Result<Self, PostgresSinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(PostgresSinkError::Connect)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool; later writes fail and count against the breaker
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn run_migrations(&self) -> Result<(), PostgresSinkError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS server_logs (
                id BIGSERIAL PRIMARY KEY,
                sequence BIGINT NOT NULL,
                logged_at TIMESTAMPTZ NOT NULL,
                level VARCHAR(16) NOT NULL,
                category VARCHAR(32) NOT NULL,
                fingerprint VARCHAR(64) NOT NULL,
                message TEXT NOT NULL,
                code VARCHAR(64),
                stack TEXT,
                metadata JSONB NOT NULL DEFAULT '{}',
                occurrence_count BIGINT NOT NULL DEFAULT 1,
                is_summary BOOLEAN NOT NULL DEFAULT FALSE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_server_logs_logged_at ON server_logs(logged_at);",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_server_logs_fingerprint ON server_logs(fingerprint);",
        )
        .execute(&self.pool)
        .await?;

        info!(table = TABLE, "Remote log table migrations completed");
        Ok(())
    }

    async fn insert(&self, entry: &LogEntry) -> Result<(), PostgresSinkError> {
        let metadata = serde_json::to_value(&entry.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO server_logs
                (sequence, logged_at, level, category, fingerprint, message, code, stack,
                 metadata, occurrence_count, is_summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.sequence as i64)
        .bind(entry.timestamp)
        .bind(entry.level.as_str())
        .bind(entry.category.to_string())
        .bind(entry.fingerprint.as_str())
        .bind(&entry.message)
        .bind(entry.code.as_deref())
        .bind(entry.stack.as_deref())
        .bind(metadata)
        .bind(entry.occurrence_count as i64)
        .bind(entry.is_summary)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Count, and unless `dry_run` delete, entries older than `days`
    pub async fn cleanup_older_than(
        &self,
        days: u32,
        dry_run: bool,
    ) -> Result<CleanupReport, PostgresSinkError> {
        let cutoff = retention_cutoff(Utc::now(), days)?;

        let matched: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM server_logs WHERE logged_at < $1")
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;

        let deleted = if dry_run || matched == 0 {
            0
        } else {
            sqlx::query("DELETE FROM server_logs WHERE logged_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?
                .rows_affected()
        };

        info!(
            cutoff = %cutoff,
            matched,
            deleted,
            dry_run,
            "Remote log cleanup finished"
        );

        Ok(CleanupReport {
            cutoff,
            matched: matched.max(0) as u64,
            deleted,
            dry_run,
        })
    }
}

/// Start of the retention period
pub fn retention_cutoff(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, PostgresSinkError> {
    if days == 0 {
        return Err(PostgresSinkError::InvalidRetention(days));
    }
    Ok(now - chrono::Duration::days(i64::from(days)))
}

#[async_trait]
impl LogSink for PostgresLogSink {
    fn name(&self) -> &str {
        "postgres"
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Remote
    }

    async fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.insert(entry).await.map_err(SinkError::from)
    }
}
