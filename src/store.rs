// SQLite home for finalized tier points. One table per tier, primary key
// (metric_name, timestamp). WAL keeps reads snapshot-isolated from the
// single writer.

use crate::models::{AggregatedValue, MetricName, Tier, TierPoint};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::instrument;

/// Bump when the table layout changes. A mismatch refuses startup; data is
/// never silently migrated.
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema version mismatch: found {found}, expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },
}

pub struct MetricStore {
    pool: SqlitePool,
}

fn tier_table(tier: Tier) -> &'static str {
    match tier {
        Tier::Raw => "history_raw",
        Tier::Minute => "history_minute",
        Tier::Hour => "history_hour",
    }
}

impl MetricStore {
    pub async fn connect(path: &str, max_pool_size: u32) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Creates tables on first run; on an existing database verifies the
    /// recorded schema version and fails hard on mismatch.
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (id INTEGER PRIMARY KEY CHECK (id = 1), version INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        let found = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(version) FROM schema_version WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        match found {
            None => {
                sqlx::query("INSERT INTO schema_version (id, version) VALUES (1, $1)")
                    .bind(SCHEMA_VERSION)
                    .execute(&self.pool)
                    .await?;
            }
            Some(v) if v == SCHEMA_VERSION => {}
            Some(v) => {
                return Err(StoreError::SchemaVersion {
                    found: v,
                    expected: SCHEMA_VERSION,
                });
            }
        }

        for tier in [Tier::Raw, Tier::Minute, Tier::Hour] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    metric_name TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    avg REAL NOT NULL,
                    min REAL NOT NULL,
                    max REAL NOT NULL,
                    count INTEGER NOT NULL,
                    PRIMARY KEY (metric_name, timestamp)
                )
                "#,
                tier_table(tier)
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Appends a batch atomically: either every point lands or none do.
    #[instrument(skip(self, points), fields(repo = "store", operation = "append_points", tier = %tier, points_count = points.len()))]
    pub async fn append_points(&self, tier: Tier, points: &[TierPoint]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO {} (metric_name, timestamp, avg, min, max, count) VALUES ($1, $2, $3, $4, $5, $6)",
            tier_table(tier)
        );
        for p in points {
            sqlx::query(&sql)
                .bind(p.metric.as_str())
                .bind(p.timestamp_ms)
                .bind(p.value.avg)
                .bind(p.value.min)
                .bind(p.value.max)
                .bind(p.value.count as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes points with ts < cutoff. Returns the number removed.
    #[instrument(skip(self), fields(repo = "store", operation = "evict_older_than", tier = %tier))]
    pub async fn evict_older_than(&self, tier: Tier, cutoff_ms: i64) -> Result<u64, StoreError> {
        let r = sqlx::query(&format!(
            "DELETE FROM {} WHERE timestamp < $1",
            tier_table(tier)
        ))
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Points for one metric in [from_ms, to_ms), ascending by timestamp.
    /// Stateless: repeat calls with the same bounds see the same committed
    /// data; a concurrent batch is either fully visible or not at all.
    #[instrument(skip(self), fields(repo = "store", operation = "query_range", tier = %tier, metric = %metric))]
    pub async fn query_range(
        &self,
        tier: Tier,
        metric: MetricName,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<(i64, AggregatedValue)>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT timestamp, avg, min, max, count FROM {} WHERE metric_name = $1 AND timestamp >= $2 AND timestamp < $3 ORDER BY timestamp ASC",
            tier_table(tier)
        ))
        .bind(metric.as_str())
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_point_row(&row)?);
        }
        Ok(out)
    }

    /// Reclaim space after eviction (run on the maintenance schedule).
    #[instrument(skip(self), fields(repo = "store", operation = "vacuum"))]
    pub async fn vacuum(&self) -> Result<(), StoreError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    fn parse_point_row(row: &SqliteRow) -> Result<(i64, AggregatedValue), StoreError> {
        let ts: i64 = row.try_get("timestamp")?;
        let avg: f64 = row.try_get("avg")?;
        let min: f64 = row.try_get("min")?;
        let max: f64 = row.try_get("max")?;
        let count: i64 = row.try_get("count")?;
        Ok((
            ts,
            AggregatedValue {
                avg,
                min,
                max,
                count: count as u32,
            },
        ))
    }
}
