// Consumer side of the pipeline: drains the ingest queue, maintains the
// open MINUTE/HOUR buckets, and feeds finalized batches to the store.
// Bucket progression is driven purely by comparing incoming timestamps to
// the current bucket key; persistence failures are absorbed with a bounded
// retry and counted, never fatal.

use crate::models::{RetentionPolicy, Snapshot, Tier, TierPoint};
use crate::queue::IngestQueue;
use crate::rollup::{bucket_start, raw_points, OpenBucket};
use crate::store::MetricStore;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters owned by the aggregator instance, exposed via accessors.
#[derive(Debug, Default)]
pub struct AggregatorStats {
    late_samples: AtomicU64,
    batches_dropped: AtomicU64,
    points_persisted: AtomicU64,
    points_evicted: AtomicU64,
}

impl AggregatorStats {
    pub fn late_samples(&self) -> u64 {
        self.late_samples.load(Ordering::Relaxed)
    }
    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }
    pub fn points_persisted(&self) -> u64 {
        self.points_persisted.load(Ordering::Relaxed)
    }
    pub fn points_evicted(&self) -> u64 {
        self.points_evicted.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub policy: RetentionPolicy,
    /// Storage write attempts before a batch is dropped and counted.
    pub write_retry_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub write_retry_base: Duration,
}

impl AggregatorConfig {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            write_retry_attempts: 3,
            write_retry_base: Duration::from_millis(100),
        }
    }
}

/// Maintenance timing for the background loop (stats logging + VACUUM).
#[derive(Debug, Clone)]
pub struct MaintenanceSchedule {
    pub stats_log_interval_secs: u64,
    /// Optional cron expression for VACUUM; local time.
    pub vacuum_schedule: Option<String>,
    /// Fixed VACUUM interval when no cron expression is set.
    pub vacuum_interval_secs: u64,
}

pub struct Aggregator {
    store: Arc<MetricStore>,
    config: AggregatorConfig,
    stats: Arc<AggregatorStats>,
    last_raw_ts: Option<i64>,
    /// RAW points accepted since the open minute bucket was created;
    /// flushed as one batch when that bucket closes.
    raw_buffer: Vec<TierPoint>,
    minute: Option<OpenBucket>,
    hour: Option<OpenBucket>,
}

impl Aggregator {
    pub fn new(store: Arc<MetricStore>, config: AggregatorConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(AggregatorStats::default()),
            last_raw_ts: None,
            raw_buffer: Vec::new(),
            minute: None,
            hour: None,
        }
    }

    pub fn stats(&self) -> Arc<AggregatorStats> {
        self.stats.clone()
    }

    /// Consume one snapshot. Late samples (timestamp not after the last
    /// accepted one) are discarded and counted; nothing else changes.
    pub async fn ingest(&mut self, snapshot: Snapshot) {
        if let Some(last) = self.last_raw_ts {
            if snapshot.timestamp_ms <= last {
                self.stats.late_samples.fetch_add(1, Ordering::Relaxed);
                debug!(
                    timestamp_ms = snapshot.timestamp_ms,
                    last_accepted_ms = last,
                    "late sample discarded"
                );
                return;
            }
        }

        let minute_closed = self
            .minute
            .as_ref()
            .is_some_and(|m| m.is_closed_by(snapshot.timestamp_ms));
        if minute_closed {
            self.close_minute(snapshot.timestamp_ms).await;
        }

        let minute_res = self.config.policy.minute.resolution_ms;
        let minute = self.minute.get_or_insert_with(|| {
            OpenBucket::new(bucket_start(snapshot.timestamp_ms, minute_res), minute_res)
        });
        minute.fold_snapshot(&snapshot);
        self.raw_buffer.extend(raw_points(&snapshot));
        self.last_raw_ts = Some(snapshot.timestamp_ms);
    }

    /// Minute boundary closure: flush the RAW batch, persist the finalized
    /// minute points, fold them into the open HOUR bucket, then run one
    /// eviction pass across all tiers.
    async fn close_minute(&mut self, now_ms: i64) {
        let Some(minute) = self.minute.take() else {
            return;
        };
        let minute_start = minute.start_ms;
        let minute_points = minute.finalize();

        let raw_batch = std::mem::take(&mut self.raw_buffer);
        self.persist_with_retry(Tier::Raw, &raw_batch).await;
        self.persist_with_retry(Tier::Minute, &minute_points).await;

        self.fold_into_hour(minute_start, &minute_points).await;
        self.evict_expired(now_ms).await;
    }

    async fn fold_into_hour(&mut self, minute_start: i64, minute_points: &[TierPoint]) {
        let hour_res = self.config.policy.hour.resolution_ms;
        let hour_closed = self
            .hour
            .as_ref()
            .is_some_and(|h| h.is_closed_by(minute_start));
        if hour_closed {
            if let Some(closed) = self.hour.take() {
                let points = closed.finalize();
                self.persist_with_retry(Tier::Hour, &points).await;
            }
        }
        let hour = self
            .hour
            .get_or_insert_with(|| OpenBucket::new(bucket_start(minute_start, hour_res), hour_res));
        for point in minute_points {
            hour.merge_point(point);
        }
    }

    /// One eviction pass per closure event keeps write amplification
    /// bounded. Cutoffs are relative to the latest accepted timestamp.
    async fn evict_expired(&self, now_ms: i64) {
        for tier in [Tier::Raw, Tier::Minute, Tier::Hour] {
            let cutoff = now_ms - self.config.policy.spec(tier).max_age_ms;
            match self.store.evict_older_than(tier, cutoff).await {
                Ok(removed) => {
                    if removed > 0 {
                        self.stats.points_evicted.fetch_add(removed, Ordering::Relaxed);
                        debug!(tier = %tier, removed, "expired points evicted");
                    }
                }
                Err(e) => {
                    warn!(tier = %tier, error = %e, "eviction failed");
                }
            }
        }
    }

    /// Bounded retry with doubling delay; a batch that still fails is
    /// logged, counted, and abandoned.
    async fn persist_with_retry(&self, tier: Tier, points: &[TierPoint]) {
        if points.is_empty() {
            return;
        }
        let mut delay = self.config.write_retry_base;
        for attempt in 1..=self.config.write_retry_attempts {
            match self.store.append_points(tier, points).await {
                Ok(()) => {
                    self.stats
                        .points_persisted
                        .fetch_add(points.len() as u64, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < self.config.write_retry_attempts => {
                    warn!(tier = %tier, attempt, error = %e, "batch write failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    warn!(
                        tier = %tier,
                        points_count = points.len(),
                        error = %e,
                        "batch write failed after retries, batch dropped"
                    );
                    self.stats.batches_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Open buckets and the unflushed RAW window are discarded on shutdown;
    /// only finalized buckets are durable.
    fn discard_open_state(&mut self) {
        let pending = self.raw_buffer.len();
        if pending > 0 || self.minute.is_some() || self.hour.is_some() {
            debug!(
                pending_raw_points = pending,
                open_minute = self.minute.is_some(),
                open_hour = self.hour.is_some(),
                "discarding open bucket state on shutdown"
            );
        }
        self.raw_buffer.clear();
        self.minute = None;
        self.hour = None;
    }
}

pub struct AggregatorDeps {
    pub queue: Arc<IngestQueue>,
    pub store: Arc<MetricStore>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Spawns the consumer loop plus the VACUUM scheduler. Returns the join
/// handle and the shared stats handle.
pub fn spawn(
    deps: AggregatorDeps,
    config: AggregatorConfig,
    schedule: MaintenanceSchedule,
) -> (tokio::task::JoinHandle<()>, Arc<AggregatorStats>) {
    let AggregatorDeps {
        queue,
        store,
        mut shutdown_rx,
    } = deps;
    let mut aggregator = Aggregator::new(store.clone(), config);
    let stats = aggregator.stats();
    let stats_for_task = stats.clone();

    let handle = tokio::spawn(async move {
        let mut stats_log_tick =
            tokio::time::interval(Duration::from_secs(schedule.stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
        tokio::spawn(vacuum_scheduler(schedule, vacuum_tx));

        loop {
            tokio::select! {
                snapshot = queue.pop() => {
                    aggregator.ingest(snapshot).await;
                }
                _ = stats_log_tick.tick() => {
                    info!(
                        queue_len = queue.len(),
                        queue_dropped_oldest = queue.dropped_oldest(),
                        late_samples = stats_for_task.late_samples(),
                        batches_dropped = stats_for_task.batches_dropped(),
                        points_persisted = stats_for_task.points_persisted(),
                        points_evicted = stats_for_task.points_evicted(),
                        "pipeline stats"
                    );
                }
                _ = vacuum_rx.recv() => {
                    match store.vacuum().await {
                        Ok(()) => info!("vacuum complete"),
                        Err(e) => warn!(error = %e, "vacuum failed"),
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("aggregator shutting down");
                    break;
                }
            }
        }
        aggregator.discard_open_state();
    });
    (handle, stats)
}

/// Sends on `tx` at each VACUUM time (cron or fixed interval). Local time
/// for cron.
async fn vacuum_scheduler(schedule: MaintenanceSchedule, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = schedule.vacuum_schedule {
        let Ok(cron) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            if let Some(next) = cron.after(&now).next() {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(schedule.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}
