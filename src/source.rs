// Metric acquisition. The pipeline only needs the `MetricSource` shape;
// `SysinfoSource` is the default OS-backed implementation.

use crate::models::MetricName;
use std::collections::BTreeMap;
use std::sync::Mutex;
use sysinfo::{Disks, Networks, System};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("metric read failed: {0}")]
    Read(String),
}

/// One reading of the full metric set, or a transient failure. Callers treat
/// failures as gaps, never as fatal.
pub trait MetricSource: Send + Sync {
    fn read(&self) -> Result<BTreeMap<MetricName, f64>, SourceError>;
}

struct SysinfoState {
    sys: System,
    networks: Networks,
    disks: Disks,
}

/// Default source backed by the sysinfo crate. Byte-counter metrics
/// (io/net) report cumulative totals since boot; consumers diff them.
pub struct SysinfoSource {
    state: Mutex<SysinfoState>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let networks = Networks::new_with_refreshed_list();
        let disks = Disks::new_with_refreshed_list();
        Self {
            state: Mutex::new(SysinfoState {
                sys,
                networks,
                disks,
            }),
        }
    }
}

impl MetricSource for SysinfoSource {
    fn read(&self) -> Result<BTreeMap<MetricName, f64>, SourceError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| SourceError::Read(format!("sysinfo lock poisoned: {e}")))?;

        state.sys.refresh_cpu_all();
        state.sys.refresh_memory();
        state.networks.refresh(true);
        state.disks.refresh(true);

        let cpu_pct = (state.sys.global_cpu_usage() as f64).clamp(0.0, 100.0);
        let total = state.sys.total_memory();
        let available = state.sys.available_memory();
        let mem_used = total.saturating_sub(available);

        let mut io_read: u64 = 0;
        let mut io_write: u64 = 0;
        for disk in state.disks.list() {
            let usage = disk.usage();
            io_read = io_read.saturating_add(usage.total_read_bytes);
            io_write = io_write.saturating_add(usage.total_written_bytes);
        }

        let mut net_rx: u64 = 0;
        let mut net_tx: u64 = 0;
        for (_name, data) in state.networks.list() {
            net_rx = net_rx.saturating_add(data.total_received());
            net_tx = net_tx.saturating_add(data.total_transmitted());
        }

        let mut metrics = BTreeMap::new();
        metrics.insert(MetricName::CpuPct, cpu_pct);
        metrics.insert(MetricName::MemUsedBytes, mem_used as f64);
        metrics.insert(MetricName::IoReadBytes, io_read as f64);
        metrics.insert(MetricName::IoWriteBytes, io_write as f64);
        metrics.insert(MetricName::NetRxBytes, net_rx as f64);
        metrics.insert(MetricName::NetTxBytes, net_tx as f64);
        Ok(metrics)
    }
}
