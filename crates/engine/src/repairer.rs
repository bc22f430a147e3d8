use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::time::interval;
use tracing::{info, warn};

use crawldeck_core::config::RepairerConfig;
use crawldeck_core::traits::{ProcessProbe, TaskRepository};
use crawldeck_core::{EngineResult, Task, TaskStatus};
use crawldeck_infrastructure::ResultLocator;
use crawldeck_realtime::Broadcaster;

/// 单轮修复的汇总
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RepairReport {
    pub examined: usize,
    pub repaired: usize,
    pub errors: usize,
}

/// 卡死任务修复器
///
/// Running 超时且进程已不存在的任务按磁盘结果收尾；Pending 超时的任务
/// 直接判失败。每轮每类有批量上限，约束单轮时延。
pub struct StuckTaskRepairer {
    task_repo: Arc<dyn TaskRepository>,
    probe: Arc<dyn ProcessProbe>,
    locator: Arc<ResultLocator>,
    broadcaster: Arc<Broadcaster>,
    config: RepairerConfig,
    total_repaired: AtomicU64,
}

impl StuckTaskRepairer {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        probe: Arc<dyn ProcessProbe>,
        locator: Arc<ResultLocator>,
        broadcaster: Arc<Broadcaster>,
        config: RepairerConfig,
    ) -> Self {
        Self {
            task_repo,
            probe,
            locator,
            broadcaster,
            config,
            total_repaired: AtomicU64::new(0),
        }
    }

    /// 启动以来累计修复的任务数
    pub fn total_repaired(&self) -> u64 {
        self.total_repaired.load(Ordering::Relaxed)
    }

    /// 一轮修复：先处理超时的 Running，再处理超时的 Pending
    pub async fn repair_cycle(&self) -> RepairReport {
        let mut report = RepairReport::default();

        let running_cutoff = Utc::now() - chrono::Duration::minutes(self.config.running_timeout_minutes);
        match self
            .task_repo
            .find_stuck(TaskStatus::Running, running_cutoff, self.config.batch_limit)
            .await
        {
            Ok(tasks) => {
                for task in tasks {
                    report.examined += 1;
                    match self.repair_running(&task).await {
                        Ok(true) => report.repaired += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!("修复 Running 任务 {} 失败: {}", task.id, e);
                            report.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("查询超时 Running 任务失败: {}", e);
                report.errors += 1;
            }
        }

        let pending_cutoff = Utc::now() - chrono::Duration::minutes(self.config.pending_timeout_minutes);
        match self
            .task_repo
            .find_stuck(TaskStatus::Pending, pending_cutoff, self.config.batch_limit)
            .await
        {
            Ok(tasks) => {
                for task in tasks {
                    report.examined += 1;
                    match self.repair_pending(&task).await {
                        Ok(()) => report.repaired += 1,
                        Err(e) => {
                            warn!("修复 Pending 任务 {} 失败: {}", task.id, e);
                            report.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("查询超时 Pending 任务失败: {}", e);
                report.errors += 1;
            }
        }

        if report.repaired > 0 {
            info!(
                "修复轮次完成: 检查 {} 个，修复 {} 个，失败 {} 个",
                report.examined, report.repaired, report.errors
            );
        }
        report
    }

    /// 超时 Running 任务的收尾
    ///
    /// 进程仍存活则跳过；进程状态未知（探测失败）也跳过，宁可下轮再看
    /// 也不误杀。进程已消失时按磁盘结果定终态。
    async fn repair_running(&self, task: &Task) -> EngineResult<bool> {
        match self.probe.is_task_process_alive(&task.id).await {
            Ok(true) => return Ok(false),
            Ok(false) => {}
            Err(e) => {
                warn!("任务 {} 进程探测失败，本轮跳过: {}", task.id, e);
                return Ok(false);
            }
        }

        let outcome = self.locator.locate(&task.id, Some(&task.project_id));
        let (status, annotation) = if outcome.max_count > 0 {
            self.task_repo
                .set_item_count(&task.id, outcome.max_count)
                .await?;
            (
                TaskStatus::Finished,
                format!("进程消失后按结果文件收尾，计入 {} 条", outcome.max_count),
            )
        } else {
            (
                TaskStatus::Failed,
                "运行超时且进程已消失，未找到任何结果".to_string(),
            )
        };

        info!(
            "修复卡死任务 {}: {} ({} 条) -> {} ({} 条)",
            task.id, task.status, task.item_count, status, outcome.max_count
        );
        self.task_repo.update_status(&task.id, status).await?;
        self.task_repo.set_error(&task.id, &annotation).await?;
        self.total_repaired.fetch_add(1, Ordering::Relaxed);

        self.broadcaster
            .push_task_update(
                &task.id,
                json!({
                    "status": status,
                    "item_count": outcome.max_count.max(task.item_count),
                }),
            )
            .await;
        Ok(true)
    }

    /// 超时 Pending 任务直接判失败，不看结果文件
    async fn repair_pending(&self, task: &Task) -> EngineResult<()> {
        info!("Pending 任务 {} 超时，判为失败", task.id);
        self.task_repo
            .update_status(&task.id, TaskStatus::Failed)
            .await?;
        self.task_repo
            .set_error(&task.id, "排队超时，从未开始执行")
            .await?;
        self.total_repaired.fetch_add(1, Ordering::Relaxed);

        self.broadcaster
            .push_task_update(
                &task.id,
                json!({
                    "status": TaskStatus::Failed,
                    "item_count": task.item_count,
                }),
            )
            .await;
        Ok(())
    }

    /// 周期修复循环
    pub async fn run_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        if !self.config.enabled {
            info!("卡死任务修复未启用");
            return;
        }

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds));
        info!(
            "卡死任务修复循环启动，周期 {} 秒",
            self.config.interval_seconds
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.repair_cycle().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("卡死任务修复循环收到停止信号");
                    break;
                }
            }
        }
    }
}
