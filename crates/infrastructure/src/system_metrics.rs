use std::time::Duration;

use sysinfo::{Disks, System};
use tokio::sync::Mutex;

/// 一次资源采样
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
}

/// 系统资源采样器（cpu / 内存 / 磁盘占用百分比）
pub struct SystemMetrics {
    system: Mutex<System>,
}

impl SystemMetrics {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// 采样一次资源占用
    ///
    /// CPU 占用需要两次间隔采样，间隔取 sysinfo 要求的最小刷新周期。
    pub async fn sample(&self) -> ResourceUsage {
        let mut system = self.system.lock().await;

        system.refresh_cpu_usage();
        tokio::time::sleep(Duration::from_millis(
            sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.as_millis() as u64 + 10,
        ))
        .await;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_percent = system.global_cpu_usage() as f64;

        let total_mem = system.total_memory();
        let mem_percent = if total_mem > 0 {
            system.used_memory() as f64 / total_mem as f64 * 100.0
        } else {
            0.0
        };

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(t, a), d| {
                (t + d.total_space(), a + d.available_space())
            });
        let disk_percent = if total > 0 {
            (total - available) as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        ResourceUsage {
            cpu_percent,
            mem_percent,
            disk_percent,
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sample_yields_plausible_percentages() {
        let metrics = SystemMetrics::new();
        let usage = metrics.sample().await;
        assert!(usage.cpu_percent >= 0.0);
        assert!(usage.mem_percent >= 0.0 && usage.mem_percent <= 100.0);
        assert!(usage.disk_percent >= 0.0 && usage.disk_percent <= 100.0);
    }
}
