// Domain models shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of collected metrics. Kept small so the schema stays bounded;
/// the string form is what lands in the `metric` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    CpuPct,
    MemUsedBytes,
    IoReadBytes,
    IoWriteBytes,
    NetRxBytes,
    NetTxBytes,
}

impl MetricName {
    pub const ALL: [MetricName; 6] = [
        MetricName::CpuPct,
        MetricName::MemUsedBytes,
        MetricName::IoReadBytes,
        MetricName::IoWriteBytes,
        MetricName::NetRxBytes,
        MetricName::NetTxBytes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CpuPct => "cpu_pct",
            MetricName::MemUsedBytes => "mem_used_bytes",
            MetricName::IoReadBytes => "io_read_bytes",
            MetricName::IoWriteBytes => "io_write_bytes",
            MetricName::NetRxBytes => "net_rx_bytes",
            MetricName::NetTxBytes => "net_tx_bytes",
        }
    }

    /// Inverse of `as_str`; unknown names come back as None so a row written
    /// by some future schema is skipped rather than crashing a read.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == s)
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped set of readings. Produced once per sampling tick,
/// consumed exactly once by the aggregator, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp_ms: i64,
    pub metrics: BTreeMap<MetricName, f64>,
}

impl Snapshot {
    pub fn new(timestamp_ms: i64, metrics: BTreeMap<MetricName, f64>) -> Self {
        Self {
            timestamp_ms,
            metrics,
        }
    }
}

/// Rollup of one or more samples. Carries enough to merge further
/// (count-weighted mean) without losing anything beyond float rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedValue {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: u32,
}

impl AggregatedValue {
    /// Aggregate of a single sample; RAW points are exactly this.
    pub fn single(value: f64) -> Self {
        Self {
            avg: value,
            min: value,
            max: value,
            count: 1,
        }
    }

    /// Fold one more sample in. Incremental mean (Welford) so long buckets
    /// do not accumulate summation error.
    pub fn fold(&mut self, value: f64) {
        self.count += 1;
        self.avg += (value - self.avg) / self.count as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Merge a finalized finer-grained aggregate (MINUTE -> HOUR rollup).
    pub fn merge(&mut self, other: &AggregatedValue) {
        let total = self.count + other.count;
        if total == 0 {
            return;
        }
        let w = other.count as f64 / total as f64;
        self.avg += (other.avg - self.avg) * w;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = total;
    }
}

/// Retention tier. Resolution and max age are configuration-driven; see
/// `RetentionPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Raw,
    Minute,
    Hour,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Raw => "raw",
            Tier::Minute => "minute",
            Tier::Hour => "hour",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted point: the unit the store appends and returns.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPoint {
    pub metric: MetricName,
    pub timestamp_ms: i64,
    pub value: AggregatedValue,
}

/// Per-tier resolution and max age, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct TierSpec {
    pub resolution_ms: i64,
    pub max_age_ms: i64,
}

/// The three tiers the pipeline maintains concurrently.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub raw: TierSpec,
    pub minute: TierSpec,
    pub hour: TierSpec,
}

impl RetentionPolicy {
    pub fn spec(&self, tier: Tier) -> TierSpec {
        match tier {
            Tier::Raw => self.raw,
            Tier::Minute => self.minute,
            Tier::Hour => self.hour,
        }
    }
}
