// Shared test helpers

#![allow(dead_code)]

use histmon::models::{MetricName, RetentionPolicy, Snapshot, TierSpec};
use histmon::store::MetricStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

pub fn cpu_only(cpu_pct: f64) -> BTreeMap<MetricName, f64> {
    let mut m = BTreeMap::new();
    m.insert(MetricName::CpuPct, cpu_pct);
    m
}

pub fn snapshot(timestamp_ms: i64, cpu_pct: f64) -> Snapshot {
    Snapshot::new(timestamp_ms, cpu_only(cpu_pct))
}

pub fn full_snapshot(timestamp_ms: i64, base: f64) -> Snapshot {
    let mut m = BTreeMap::new();
    for (i, metric) in MetricName::ALL.iter().enumerate() {
        m.insert(*metric, base + i as f64);
    }
    Snapshot::new(timestamp_ms, m)
}

/// 1s sampling, generous max ages so tests control eviction explicitly.
pub fn test_policy() -> RetentionPolicy {
    RetentionPolicy {
        raw: TierSpec {
            resolution_ms: 1_000,
            max_age_ms: 365 * 24 * 3_600_000,
        },
        minute: TierSpec {
            resolution_ms: 60_000,
            max_age_ms: 365 * 24 * 3_600_000,
        },
        hour: TierSpec {
            resolution_ms: 3_600_000,
            max_age_ms: 365 * 24 * 3_600_000,
        },
    }
}

/// Fresh store in a temp dir; keep the TempDir alive for the test duration.
pub async fn temp_store() -> (TempDir, Arc<MetricStore>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");
    let store = MetricStore::connect(path.to_str().unwrap(), 4)
        .await
        .unwrap();
    store.init().await.unwrap();
    (dir, Arc::new(store))
}
