// Downsampling primitives: bucket keying and the open-bucket fold/finalize
// cycle. Pure logic; persistence stays in the aggregator loop.

use crate::models::{AggregatedValue, MetricName, Snapshot, TierPoint};
use std::collections::BTreeMap;

/// Floor a timestamp to its bucket boundary.
pub fn bucket_start(timestamp_ms: i64, resolution_ms: i64) -> i64 {
    (timestamp_ms / resolution_ms) * resolution_ms
}

/// One partially-filled rollup window. Created lazily on the first
/// contributing sample, finalized when an incoming timestamp maps to a
/// later bucket key.
#[derive(Debug, Clone)]
pub struct OpenBucket {
    pub start_ms: i64,
    pub resolution_ms: i64,
    stats: BTreeMap<MetricName, AggregatedValue>,
}

impl OpenBucket {
    pub fn new(start_ms: i64, resolution_ms: i64) -> Self {
        Self {
            start_ms,
            resolution_ms,
            stats: BTreeMap::new(),
        }
    }

    /// True when `timestamp_ms` falls past this bucket's window.
    pub fn is_closed_by(&self, timestamp_ms: i64) -> bool {
        bucket_start(timestamp_ms, self.resolution_ms) > self.start_ms
    }

    /// Fold the readings of one snapshot into the running aggregates.
    pub fn fold_snapshot(&mut self, snapshot: &Snapshot) {
        for (&metric, &value) in &snapshot.metrics {
            match self.stats.get_mut(&metric) {
                Some(agg) => agg.fold(value),
                None => {
                    self.stats.insert(metric, AggregatedValue::single(value));
                }
            }
        }
    }

    /// Fold a finalized finer-grained point in (MINUTE aggregate -> open
    /// HOUR bucket). Count-weighted merge, no precision loss beyond float
    /// rounding.
    pub fn merge_point(&mut self, point: &TierPoint) {
        match self.stats.get_mut(&point.metric) {
            Some(agg) => agg.merge(&point.value),
            None => {
                self.stats.insert(point.metric, point.value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Close the bucket: one point per metric, all stamped with the bucket
    /// start so tier timestamps stay aligned to the resolution.
    pub fn finalize(self) -> Vec<TierPoint> {
        self.stats
            .into_iter()
            .map(|(metric, value)| TierPoint {
                metric,
                timestamp_ms: self.start_ms,
                value,
            })
            .collect()
    }
}

/// RAW points for one snapshot: each reading maps 1:1 to a point, value
/// inserted directly (avg = min = max, count = 1).
pub fn raw_points(snapshot: &Snapshot) -> Vec<TierPoint> {
    snapshot
        .metrics
        .iter()
        .map(|(&metric, &value)| TierPoint {
            metric,
            timestamp_ms: snapshot.timestamp_ms,
            value: AggregatedValue::single(value),
        })
        .collect()
}
