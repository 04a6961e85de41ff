// Aggregator tests: tier rollover, late samples, gaps, eviction

mod common;

use common::{snapshot, temp_store, test_policy};
use histmon::aggregator::{Aggregator, AggregatorConfig};
use histmon::models::{AggregatedValue, MetricName, Tier, TierPoint};

fn aggregator(store: std::sync::Arc<histmon::store::MetricStore>) -> Aggregator {
    Aggregator::new(store, AggregatorConfig::new(test_policy()))
}

#[tokio::test]
async fn minute_close_persists_raw_and_minute_points() {
    let (_dir, store) = temp_store().await;
    let mut agg = aggregator(store.clone());

    // One sample per second across the whole minute [60s, 120s).
    for k in 0..60 {
        agg.ingest(snapshot(60_000 + k * 1_000, k as f64)).await;
    }
    // Nothing durable until the boundary closes.
    let raw = store
        .query_range(Tier::Raw, MetricName::CpuPct, 0, i64::MAX)
        .await
        .unwrap();
    assert!(raw.is_empty());

    agg.ingest(snapshot(120_000, 0.0)).await;

    let raw = store
        .query_range(Tier::Raw, MetricName::CpuPct, 60_000, 120_000)
        .await
        .unwrap();
    assert_eq!(raw.len(), 60);
    for (k, (ts, value)) in raw.iter().enumerate() {
        // RAW round-trips the exact input value, untransformed.
        assert_eq!(*ts, 60_000 + k as i64 * 1_000);
        assert_eq!(value.avg, k as f64);
        assert_eq!(value.count, 1);
    }

    let minute = store
        .query_range(Tier::Minute, MetricName::CpuPct, 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(minute.len(), 1);
    let (ts, value) = minute[0];
    assert_eq!(ts, 60_000);
    assert_eq!(value.count, 60);
    assert!((value.avg - 29.5).abs() < 1e-9);
    assert_eq!(value.min, 0.0);
    assert_eq!(value.max, 59.0);
}

#[tokio::test]
async fn late_sample_is_counted_and_changes_nothing() {
    let (_dir, store) = temp_store().await;
    let mut agg = aggregator(store.clone());

    agg.ingest(snapshot(60_000, 10.0)).await;
    agg.ingest(snapshot(61_000, 20.0)).await;
    // Clock stepped backwards: rejected, not folded anywhere.
    agg.ingest(snapshot(50_000, 99.0)).await;
    assert_eq!(agg.stats().late_samples(), 1);

    agg.ingest(snapshot(120_000, 0.0)).await;

    let raw = store
        .query_range(Tier::Raw, MetricName::CpuPct, 0, 120_000)
        .await
        .unwrap();
    let timestamps: Vec<i64> = raw.iter().map(|(ts, _)| *ts).collect();
    assert_eq!(timestamps, vec![60_000, 61_000]);

    let minute = store
        .query_range(Tier::Minute, MetricName::CpuPct, 0, 120_000)
        .await
        .unwrap();
    assert_eq!(minute.len(), 1);
    assert_eq!(minute[0].1.count, 2);
    assert_eq!(minute[0].1.max, 20.0);
}

#[tokio::test]
async fn equal_timestamp_is_late() {
    let (_dir, store) = temp_store().await;
    let mut agg = aggregator(store);
    agg.ingest(snapshot(60_000, 10.0)).await;
    agg.ingest(snapshot(60_000, 11.0)).await;
    assert_eq!(agg.stats().late_samples(), 1);
}

#[tokio::test]
async fn gap_leaves_hole_in_raw_and_reduced_minute_count() {
    let (_dir, store) = temp_store().await;
    let mut agg = aggregator(store.clone());

    // Sampler pauses for 3 intervals mid-minute.
    for ts in [60_000, 61_000, 65_000, 66_000] {
        agg.ingest(snapshot(ts, 5.0)).await;
    }
    agg.ingest(snapshot(120_000, 0.0)).await;

    let raw = store
        .query_range(Tier::Raw, MetricName::CpuPct, 60_000, 120_000)
        .await
        .unwrap();
    let timestamps: Vec<i64> = raw.iter().map(|(ts, _)| *ts).collect();
    // The pause is visible as a hole; no synthetic points fill it.
    assert_eq!(timestamps, vec![60_000, 61_000, 65_000, 66_000]);

    let minute = store
        .query_range(Tier::Minute, MetricName::CpuPct, 0, 120_000)
        .await
        .unwrap();
    assert_eq!(minute.len(), 1);
    assert_eq!(minute[0].1.count, 4);
}

#[tokio::test]
async fn hour_bucket_rolls_up_finalized_minutes() {
    let (_dir, store) = temp_store().await;
    let mut agg = aggregator(store.clone());

    // One sample per minute for a full hour, then two more to close the
    // hour boundary (minute 60 closes on minute 61's arrival).
    for m in 0..=61i64 {
        agg.ingest(snapshot(m * 60_000, m as f64)).await;
    }

    let hour = store
        .query_range(Tier::Hour, MetricName::CpuPct, 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(hour.len(), 1);
    let (ts, value) = hour[0];
    assert_eq!(ts, 0);
    assert_eq!(value.count, 60);
    assert!((value.avg - 29.5).abs() < 1e-9);
    assert_eq!(value.min, 0.0);
    assert_eq!(value.max, 59.0);
}

#[tokio::test]
async fn closure_evicts_expired_points_per_tier() {
    let (_dir, store) = temp_store().await;
    let mut policy = test_policy();
    policy.raw.max_age_ms = 70_000;
    let mut agg = Aggregator::new(store.clone(), AggregatorConfig::new(policy));

    // A stale point from a previous run.
    store
        .append_points(
            Tier::Raw,
            &[TierPoint {
                metric: MetricName::CpuPct,
                timestamp_ms: 0,
                value: AggregatedValue::single(1.0),
            }],
        )
        .await
        .unwrap();

    agg.ingest(snapshot(60_000, 10.0)).await;
    agg.ingest(snapshot(61_000, 10.0)).await;
    agg.ingest(snapshot(120_000, 0.0)).await; // closure event, now = 120s

    assert!(agg.stats().points_evicted() >= 1);
    let raw = store
        .query_range(Tier::Raw, MetricName::CpuPct, 0, i64::MAX)
        .await
        .unwrap();
    let cutoff = 120_000 - 70_000;
    assert!(raw.iter().all(|(ts, _)| *ts >= cutoff));
    // The fresh minute's points survived.
    assert!(raw.iter().any(|(ts, _)| *ts == 60_000));
}

#[tokio::test]
async fn multi_metric_snapshots_roll_up_per_metric() {
    let (_dir, store) = temp_store().await;
    let mut agg = aggregator(store.clone());

    for k in 0..3i64 {
        agg.ingest(common::full_snapshot(60_000 + k * 1_000, 10.0 * k as f64))
            .await;
    }
    agg.ingest(common::full_snapshot(120_000, 0.0)).await;

    for metric in MetricName::ALL {
        let minute = store
            .query_range(Tier::Minute, metric, 0, 120_000)
            .await
            .unwrap();
        assert_eq!(minute.len(), 1, "one minute point per metric");
        assert_eq!(minute[0].1.count, 3);
    }
}

#[tokio::test]
async fn stats_start_at_zero() {
    let (_dir, store) = temp_store().await;
    let agg = Aggregator::new(store, AggregatorConfig::new(test_policy()));
    let stats = agg.stats();
    assert_eq!(stats.late_samples(), 0);
    assert_eq!(stats.batches_dropped(), 0);
    assert_eq!(stats.points_persisted(), 0);
    assert_eq!(stats.points_evicted(), 0);
}
