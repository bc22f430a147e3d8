use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{error, info, warn};

use crawldeck_core::config::SweeperConfig;
use crawldeck_core::traits::TaskRepository;
use crawldeck_core::EngineResult;

use crate::reconciler::{ReconcileOutcome, StatisticsReconciler};

/// 单项目的巡检小计
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProjectSweep {
    pub checked: usize,
    pub fixed: usize,
}

/// 一轮巡检的汇总报告
///
/// 单任务失败只计数、不中断批次；管理端拿到的是部分成功加错误清单。
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub checked: usize,
    pub fixed: usize,
    pub errors: usize,
    pub error_messages: Vec<String>,
    pub per_project: HashMap<String, ProjectSweep>,
}

impl SweepReport {
    fn empty() -> Self {
        Self {
            started_at: Utc::now(),
            duration_ms: 0,
            checked: 0,
            fixed: 0,
            errors: 0,
            error_messages: Vec::new(),
            per_project: HashMap::new(),
        }
    }
}

/// 批量巡检器
///
/// 周期性枚举窗口内的已完成任务逐个对账，并保留有限的历史报告供报表查询。
pub struct BatchSweeper {
    task_repo: Arc<dyn TaskRepository>,
    reconciler: Arc<StatisticsReconciler>,
    config: SweeperConfig,
    history: RwLock<VecDeque<SweepReport>>,
}

impl BatchSweeper {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        reconciler: Arc<StatisticsReconciler>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            task_repo,
            reconciler,
            config,
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// 全量巡检：窗口内所有项目的已完成任务
    pub async fn sweep_all(&self, window: chrono::Duration) -> SweepReport {
        self.sweep(window, None).await
    }

    /// 项目级巡检（人工触发的修复入口）
    pub async fn sweep_project(&self, project_id: &str) -> SweepReport {
        let window = chrono::Duration::hours(self.config.window_hours);
        self.sweep(window, Some(project_id)).await
    }

    /// 单任务修复
    pub async fn sweep_task(&self, task_id: &str) -> EngineResult<ReconcileOutcome> {
        self.reconciler.reconcile(task_id).await
    }

    async fn sweep(&self, window: chrono::Duration, project_id: Option<&str>) -> SweepReport {
        let started = std::time::Instant::now();
        let mut report = SweepReport::empty();
        let since = Utc::now() - window;

        let tasks = match self.task_repo.find_finished_since(since, project_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("枚举待巡检任务失败: {}", e);
                report.errors = 1;
                report.error_messages.push(format!("枚举任务失败: {e}"));
                report.duration_ms = started.elapsed().as_millis() as u64;
                self.record(report.clone()).await;
                return report;
            }
        };

        info!(
            "开始巡检，窗口 {} 小时，共 {} 个任务",
            window.num_hours(),
            tasks.len()
        );

        for task in &tasks {
            let entry = report.per_project.entry(task.project_id.clone()).or_default();
            entry.checked += 1;
            report.checked += 1;

            match self.reconciler.reconcile(&task.id).await {
                Ok(outcome) if outcome.fixed => {
                    entry.fixed += 1;
                    report.fixed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    // 单任务失败不中断批次
                    warn!("任务 {} 对账失败: {}", task.id, e);
                    report.errors += 1;
                    report.error_messages.push(format!("{}: {e}", task.id));
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "巡检完成: 检查 {} 个，修正 {} 个，失败 {} 个，耗时 {}ms",
            report.checked, report.fixed, report.errors, report.duration_ms
        );

        self.record(report.clone()).await;
        report
    }

    async fn record(&self, report: SweepReport) {
        let mut history = self.history.write().await;
        history.push_back(report);
        while history.len() > self.config.history_size {
            history.pop_front();
        }
    }

    /// 默认报表窗口内的历史报告
    pub async fn report_default(&self) -> Vec<SweepReport> {
        self.report(self.config.report_window_days).await
    }

    /// 时间窗口内的历史报告
    pub async fn report(&self, window_days: i64) -> Vec<SweepReport> {
        let since = Utc::now() - chrono::Duration::days(window_days);
        self.history
            .read()
            .await
            .iter()
            .filter(|r| r.started_at >= since)
            .cloned()
            .collect()
    }

    /// 立即执行一轮默认窗口的全量巡检
    pub async fn run_now(&self) -> SweepReport {
        self.sweep_all(chrono::Duration::hours(self.config.window_hours))
            .await
    }

    /// 周期巡检循环；收到停止信号后让在途一轮跑完再退出
    pub async fn run_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        if !self.config.enabled {
            info!("批量巡检未启用");
            return;
        }

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds));
        info!(
            "批量巡检循环启动，周期 {} 秒",
            self.config.interval_seconds
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.run_now().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("批量巡检循环收到停止信号");
                    break;
                }
            }
        }
    }
}
