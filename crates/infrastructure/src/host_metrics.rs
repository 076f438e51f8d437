//! sysinfo-backed host metrics for the health report

use std::sync::Mutex;
use std::time::Instant;

use logshield_domain::{HostMetrics, HostMetricsError, HostMetricsProvider};
use sysinfo::{ProcessesToUpdate, System};

pub struct SysinfoHostMetrics {
    sys: Mutex<System>,
    started_at: Instant,
}

impl SysinfoHostMetrics {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
            started_at: Instant::now(),
        }
    }
}

impl Default for SysinfoHostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetricsProvider for SysinfoHostMetrics {
    fn collect(&self) -> Result<HostMetrics, HostMetricsError> {
        let pid = sysinfo::get_current_pid().map_err(|e| HostMetricsError(e.to_string()))?;

        let mut sys = self
            .sys
            .lock()
            .map_err(|_| HostMetricsError("metrics state poisoned".to_string()))?;
        sys.refresh_memory();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process_memory_bytes = sys.process(pid).map(|p| p.memory()).unwrap_or(0);
        let load = System::load_average();
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Ok(HostMetrics {
            pid: pid.as_u32(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            process_memory_bytes,
            total_memory_bytes: sys.total_memory(),
            used_memory_bytes: sys.used_memory(),
            load_average: [load.one, load.five, load.fifteen],
            cpu_count,
        })
    }
}
