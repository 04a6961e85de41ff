use anyhow::Result;
use histmon::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let policy = app_config.retention_policy();

    // Schema mismatch aborts here; data is never silently migrated.
    let store = Arc::new(
        store::MetricStore::connect(&app_config.database.path, app_config.database.max_pool_size)
            .await?,
    );
    store.init().await?;
    tracing::info!(path = %app_config.database.path, "store ready");

    let queue = Arc::new(queue::IngestQueue::new(
        app_config.sampling.queue_capacity,
        Duration::from_millis(app_config.sampling.push_timeout_ms),
    ));
    let source: Arc<dyn source::MetricSource> = Arc::new(source::SysinfoSource::new());

    let (sampler_shutdown_tx, sampler_shutdown_rx) = tokio::sync::oneshot::channel();
    let (sampler_handle, sampler_stats) = sampler::spawn(
        sampler::SamplerDeps {
            source,
            queue: queue.clone(),
            shutdown_rx: sampler_shutdown_rx,
        },
        sampler::SamplerConfig {
            interval: Duration::from_millis(app_config.sampling.interval_ms),
        },
    );

    let (agg_shutdown_tx, agg_shutdown_rx) = tokio::sync::oneshot::channel();
    let (agg_handle, _agg_stats) = aggregator::spawn(
        aggregator::AggregatorDeps {
            queue: queue.clone(),
            store: store.clone(),
            shutdown_rx: agg_shutdown_rx,
        },
        aggregator::AggregatorConfig::new(policy),
        aggregator::MaintenanceSchedule {
            stats_log_interval_secs: app_config.maintenance.stats_log_interval_secs,
            vacuum_schedule: app_config.maintenance.vacuum_schedule.clone(),
            vacuum_interval_secs: app_config.maintenance.vacuum_interval_secs,
        },
    );

    tracing::info!(
        interval_ms = app_config.sampling.interval_ms,
        queue_capacity = app_config.sampling.queue_capacity,
        "collection pipeline running"
    );

    shutdown_signal().await;
    tracing::info!(
        samples_produced = sampler_stats.samples_produced(),
        degraded = sampler_stats.is_degraded(),
        "received shutdown signal"
    );
    let _ = sampler_shutdown_tx.send(());
    let _ = agg_shutdown_tx.send(());
    let _ = sampler_handle.await;
    let _ = agg_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
