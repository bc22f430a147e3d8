use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

use crawldeck_core::traits::ProcessProbe;
use crawldeck_core::{EngineError, EngineResult};

/// 基于 sysinfo 进程枚举的存活探测
///
/// 扫描所有进程的命令行，寻找任务 id 子串。枚举在阻塞线程上执行并套显式
/// 超时；超时返回 Err，调用方按"未知"处理而不是当作进程已死。
pub struct SysinfoProcessProbe {
    timeout: Duration,
}

impl SysinfoProcessProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SysinfoProcessProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ProcessProbe for SysinfoProcessProbe {
    async fn is_task_process_alive(&self, task_id: &str) -> EngineResult<bool> {
        let needle = task_id.to_string();
        let scan = tokio::task::spawn_blocking(move || {
            let mut sys = System::new();
            sys.refresh_processes(ProcessesToUpdate::All, true);
            sys.processes().values().any(|process| {
                process
                    .cmd()
                    .iter()
                    .any(|arg| arg.to_string_lossy().contains(&needle))
            })
        });

        let alive = tokio::time::timeout(self.timeout, scan)
            .await
            .map_err(|_| EngineError::ProbeTimeout(format!("进程扫描超时: {task_id}")))?
            .map_err(|e| EngineError::Internal(format!("进程扫描任务失败: {e}")))?;

        debug!("任务 {} 进程存活探测结论: {}", task_id, alive);
        Ok(alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_task_id_not_alive() {
        let probe = SysinfoProcessProbe::default();
        let alive = probe
            .is_task_process_alive("no-such-task-id-a8f3e9d2")
            .await
            .unwrap();
        assert!(!alive);
    }
}
