use crate::models::{RetentionPolicy, TierSpec};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sampling: SamplingConfig,
    pub retention: RetentionConfig,
    pub query: QueryConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/histmon.db".into(),
            max_pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_ms: u64,
    pub queue_capacity: usize,
    /// How long a push may wait for queue space before the oldest queued
    /// snapshot is dropped to admit the newest.
    pub push_timeout_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            queue_capacity: 64,
            push_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub raw_max_age_secs: u64,
    pub minute_max_age_secs: u64,
    pub hour_max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            raw_max_age_secs: 3_600,              // 1 hour
            minute_max_age_secs: 24 * 3_600,      // 1 day
            hour_max_age_secs: 30 * 24 * 3_600,   // 30 days
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Max points a single range query should yield before the facade steps
    /// up to a coarser tier.
    pub point_ceiling: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            point_ceiling: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * * *" = 03:00 daily). Local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
    /// How often to log pipeline stats (drops, late samples, points persisted) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            vacuum_schedule: None,
            vacuum_interval_secs: 24 * 3_600,
            stats_log_interval_secs: 300,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::load_from_str(&s),
            // Missing file runs on documented defaults.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Tier resolutions and max ages as the aggregator consumes them.
    /// RAW resolution is the sampling interval itself.
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            raw: TierSpec {
                resolution_ms: self.sampling.interval_ms as i64,
                max_age_ms: self.retention.raw_max_age_secs as i64 * 1_000,
            },
            minute: TierSpec {
                resolution_ms: 60_000,
                max_age_ms: self.retention.minute_max_age_secs as i64 * 1_000,
            },
            hour: TierSpec {
                resolution_ms: 3_600_000,
                max_age_ms: self.retention.hour_max_age_secs as i64 * 1_000,
            },
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.sampling.interval_ms > 0,
            "sampling.interval_ms must be > 0, got {}",
            self.sampling.interval_ms
        );
        anyhow::ensure!(
            self.sampling.interval_ms <= 60_000,
            "sampling.interval_ms must not exceed one minute, got {}",
            self.sampling.interval_ms
        );
        anyhow::ensure!(
            self.sampling.queue_capacity > 0,
            "sampling.queue_capacity must be > 0, got {}",
            self.sampling.queue_capacity
        );
        anyhow::ensure!(
            self.retention.raw_max_age_secs > 0,
            "retention.raw_max_age_secs must be > 0, got {}",
            self.retention.raw_max_age_secs
        );
        anyhow::ensure!(
            self.retention.minute_max_age_secs >= self.retention.raw_max_age_secs,
            "retention.minute_max_age_secs must be >= raw_max_age_secs, got {}",
            self.retention.minute_max_age_secs
        );
        anyhow::ensure!(
            self.retention.hour_max_age_secs >= self.retention.minute_max_age_secs,
            "retention.hour_max_age_secs must be >= minute_max_age_secs, got {}",
            self.retention.hour_max_age_secs
        );
        anyhow::ensure!(
            self.query.point_ceiling > 0,
            "query.point_ceiling must be > 0, got {}",
            self.query.point_ceiling
        );
        anyhow::ensure!(
            self.maintenance.vacuum_interval_secs > 0,
            "maintenance.vacuum_interval_secs must be > 0, got {}",
            self.maintenance.vacuum_interval_secs
        );
        anyhow::ensure!(
            self.maintenance.stats_log_interval_secs > 0,
            "maintenance.stats_log_interval_secs must be > 0, got {}",
            self.maintenance.stats_log_interval_secs
        );
        Ok(())
    }
}
