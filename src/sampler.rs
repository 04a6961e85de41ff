// Timer-driven producer: reads the metric source each tick and hands the
// snapshot to the ingest queue. A failed read is a gap, never fatal; three
// consecutive failures mark the sampler degraded until the next success.

use crate::models::Snapshot;
use crate::queue::{IngestQueue, PushOutcome};
use crate::source::MetricSource;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consecutive read failures before the sampler reports itself degraded.
const DEGRADED_THRESHOLD: u32 = 3;

/// Counters owned by the sampler instance, exposed via accessors.
#[derive(Debug, Default)]
pub struct SamplerStats {
    samples_produced: AtomicU64,
    read_failures: AtomicU64,
    degraded: AtomicBool,
}

impl SamplerStats {
    pub fn samples_produced(&self) -> u64 {
        self.samples_produced.load(Ordering::Relaxed)
    }
    /// Total failed reads; each one is a gap in the series.
    pub fn read_failures(&self) -> u64 {
        self.read_failures.load(Ordering::Relaxed)
    }
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

pub struct SamplerDeps {
    pub source: Arc<dyn MetricSource>,
    pub queue: Arc<IngestQueue>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub interval: Duration,
}

pub fn spawn(
    deps: SamplerDeps,
    config: SamplerConfig,
) -> (tokio::task::JoinHandle<()>, Arc<SamplerStats>) {
    let SamplerDeps {
        source,
        queue,
        mut shutdown_rx,
    } = deps;
    let stats = Arc::new(SamplerStats::default());
    let task_stats = stats.clone();

    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let timestamp_ms = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis() as i64)
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "system time error");
                            0
                        });

                    match source.read() {
                        Ok(metrics) => {
                            consecutive_failures = 0;
                            if task_stats.degraded.swap(false, Ordering::Relaxed) {
                                info!("metric source recovered, leaving degraded state");
                            }
                            let snapshot = Snapshot::new(timestamp_ms, metrics);
                            if queue.push(snapshot).await == PushOutcome::DroppedOldest {
                                debug!("ingest queue full, oldest snapshot dropped");
                            }
                            task_stats.samples_produced.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            task_stats.read_failures.fetch_add(1, Ordering::Relaxed);
                            consecutive_failures += 1;
                            warn!(
                                error = %e,
                                consecutive_failures,
                                "metric read failed, sample skipped"
                            );
                            if consecutive_failures == DEGRADED_THRESHOLD {
                                task_stats.degraded.store(true, Ordering::Relaxed);
                                warn!(
                                    threshold = DEGRADED_THRESHOLD,
                                    "sampler degraded after consecutive read failures"
                                );
                            }
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("sampler shutting down");
                    break;
                }
            }
        }
    });
    (handle, stats)
}
