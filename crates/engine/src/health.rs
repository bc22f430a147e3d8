use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{error, info, warn};

use crawldeck_core::config::HealthConfig;
use crawldeck_core::models::{Alert, DependencyStatus, HealthSnapshot};
use crawldeck_core::traits::{DependencyProber, EventBus, ScheduleRepository, TaskRepository};
use crawldeck_core::TaskStatus;
use crawldeck_infrastructure::{ResourceUsage, SystemMetrics};
use crawldeck_realtime::Broadcaster;

use crate::reconciler::StatisticsReconciler;

/// 健康采样器
///
/// 三个独立节奏的循环：完整检查（资源 + 依赖 + 任务口径）、资源采样、
/// 数据完整性巡检。所有结论都落进有界的快照环，供 API 查询与告警推送。
pub struct HealthSampler {
    task_repo: Arc<dyn TaskRepository>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    event_bus: Arc<dyn EventBus>,
    prober: Arc<dyn DependencyProber>,
    metrics: Arc<SystemMetrics>,
    reconciler: Arc<StatisticsReconciler>,
    broadcaster: Arc<Broadcaster>,
    config: HealthConfig,
    hostname: String,
    snapshots: RwLock<VecDeque<HealthSnapshot>>,
    auto_repairs: AtomicU64,
}

impl HealthSampler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        event_bus: Arc<dyn EventBus>,
        prober: Arc<dyn DependencyProber>,
        metrics: Arc<SystemMetrics>,
        reconciler: Arc<StatisticsReconciler>,
        broadcaster: Arc<Broadcaster>,
        config: HealthConfig,
    ) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            task_repo,
            schedule_repo,
            event_bus,
            prober,
            metrics,
            reconciler,
            broadcaster,
            config,
            hostname,
            snapshots: RwLock::new(VecDeque::new()),
            auto_repairs: AtomicU64::new(0),
        }
    }

    /// 最近一次快照
    pub async fn current(&self) -> Option<HealthSnapshot> {
        self.snapshots.read().await.back().cloned()
    }

    /// 快照历史，旧在前
    pub async fn history(&self) -> Vec<HealthSnapshot> {
        self.snapshots.read().await.iter().cloned().collect()
    }

    /// 一次完整健康检查
    pub async fn check_once(&self) -> HealthSnapshot {
        let usage = self.metrics.sample().await;
        let mut issues = self.resource_issues(&usage);

        let dependencies = self.probe_dependencies().await;
        for dep in &dependencies {
            if !dep.healthy {
                issues.push(format!(
                    "依赖 {} 不可达: {}",
                    dep.name,
                    dep.detail.as_deref().unwrap_or("无详情")
                ));
            }
        }

        let (running, recent_failed) = self.population_issues(&mut issues).await;

        let snapshot = HealthSnapshot {
            timestamp: Utc::now(),
            hostname: self.hostname.clone(),
            cpu_percent: usage.cpu_percent,
            mem_percent: usage.mem_percent,
            disk_percent: usage.disk_percent,
            dependencies,
            running_tasks: running,
            recent_failed_tasks: recent_failed,
            issues,
            auto_repairs: self.auto_repairs.load(Ordering::Relaxed),
        };

        if !snapshot.is_healthy() {
            warn!("健康检查发现 {} 项问题: {:?}", snapshot.issues.len(), snapshot.issues);
            let alert = Alert::warning("health", snapshot.issues.join("; "));
            self.broadcaster
                .push_alert(json!({
                    "alert": alert,
                    "snapshot": snapshot,
                }))
                .await;
        }

        self.record(snapshot.clone()).await;
        snapshot
    }

    fn resource_issues(&self, usage: &ResourceUsage) -> Vec<String> {
        let mut issues = Vec::new();
        if usage.cpu_percent > self.config.cpu_threshold_percent {
            issues.push(format!("CPU 占用过高: {:.1}%", usage.cpu_percent));
        }
        if usage.mem_percent > self.config.mem_threshold_percent {
            issues.push(format!("内存占用过高: {:.1}%", usage.mem_percent));
        }
        if usage.disk_percent > self.config.disk_threshold_percent {
            issues.push(format!("磁盘占用过高: {:.1}%", usage.disk_percent));
        }
        issues
    }

    async fn probe_dependencies(&self) -> Vec<DependencyStatus> {
        let mut statuses = Vec::new();

        statuses.push(match self.task_repo.ping().await {
            Ok(()) => DependencyStatus {
                name: "database".to_string(),
                healthy: true,
                detail: None,
            },
            Err(e) => DependencyStatus {
                name: "database".to_string(),
                healthy: false,
                detail: Some(e.to_string()),
            },
        });

        statuses.push(match self.event_bus.ping().await {
            Ok(()) => DependencyStatus {
                name: "event_bus".to_string(),
                healthy: true,
                detail: None,
            },
            Err(e) => DependencyStatus {
                name: "event_bus".to_string(),
                healthy: false,
                detail: Some(e.to_string()),
            },
        });

        for endpoint in &self.config.dependencies {
            statuses.push(self.prober.probe(&endpoint.name, &endpoint.url).await);
        }
        statuses
    }

    /// 任务口径检查，返回 (运行中数, 近一小时失败数)
    async fn population_issues(&self, issues: &mut Vec<String>) -> (i64, i64) {
        let running = match self.task_repo.count_by_status(TaskStatus::Running).await {
            Ok(count) => {
                if count > self.config.max_running_tasks {
                    issues.push(format!("运行中任务过多: {count}"));
                }
                count
            }
            Err(e) => {
                issues.push(format!("统计运行中任务失败: {e}"));
                -1
            }
        };

        let since = Utc::now() - chrono::Duration::hours(1);
        let recent_failed = match self.task_repo.count_failed_since(since).await {
            Ok(count) => {
                if count > self.config.max_recent_failures {
                    issues.push(format!("近一小时失败任务过多: {count}"));
                }
                count
            }
            Err(e) => {
                issues.push(format!("统计失败任务失败: {e}"));
                -1
            }
        };

        match self.schedule_repo.count_active().await {
            Ok(0) => issues.push("没有任何启用的调度".to_string()),
            Ok(_) => {}
            Err(e) => issues.push(format!("统计启用调度失败: {e}")),
        }

        (running, recent_failed)
    }

    /// 完整性巡检：抽样零条目的 Finished 任务逐个对账自愈
    pub async fn integrity_pass(&self) -> u64 {
        let tasks = match self
            .task_repo
            .find_zero_item_finished(self.config.integrity_sample_size)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("完整性巡检抽样失败: {}", e);
                return 0;
            }
        };

        let mut repaired = 0;
        for task in &tasks {
            match self.reconciler.reconcile(&task.id).await {
                Ok(outcome) if outcome.fixed => {
                    repaired += 1;
                    self.auto_repairs.fetch_add(1, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => warn!("完整性巡检对账任务 {} 失败: {}", task.id, e),
            }
        }

        if repaired > 0 {
            info!("完整性巡检自愈 {} 个任务 (抽样 {})", repaired, tasks.len());
        }
        repaired
    }

    async fn record(&self, snapshot: HealthSnapshot) {
        let mut snapshots = self.snapshots.write().await;
        snapshots.push_back(snapshot);
        while snapshots.len() > self.config.history_size {
            snapshots.pop_front();
        }
    }

    /// 三个采样节奏各跑各的循环，慢的检查不拖慢快的采样
    pub async fn run_loop(
        self: Arc<Self>,
        shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        if !self.config.enabled {
            info!("健康采样未启用");
            return;
        }

        info!(
            "健康采样循环启动 (检查 {}s / 采样 {}s / 完整性 {}s)",
            self.config.check_interval_seconds,
            self.config.metrics_interval_seconds,
            self.config.integrity_interval_seconds
        );

        let check = tokio::spawn(self.clone().run_check_loop(shutdown_rx.resubscribe()));
        let metrics = tokio::spawn(self.clone().run_metrics_loop(shutdown_rx.resubscribe()));
        let integrity = tokio::spawn(self.run_integrity_loop(shutdown_rx));
        let _ = tokio::join!(check, metrics, integrity);
        info!("健康采样循环已全部停止");
    }

    async fn run_check_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut tick = interval(Duration::from_secs(self.config.check_interval_seconds));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.check_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("健康检查循环收到停止信号");
                    break;
                }
            }
        }
    }

    async fn run_metrics_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut tick = interval(Duration::from_secs(self.config.metrics_interval_seconds));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let usage = self.metrics.sample().await;
                    info!(
                        "资源采样: cpu {:.1}% / 内存 {:.1}% / 磁盘 {:.1}%",
                        usage.cpu_percent, usage.mem_percent, usage.disk_percent
                    );
                }
                _ = shutdown_rx.recv() => {
                    info!("资源采样循环收到停止信号");
                    break;
                }
            }
        }
    }

    async fn run_integrity_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut tick = interval(Duration::from_secs(self.config.integrity_interval_seconds));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.integrity_pass().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("完整性巡检循环收到停止信号");
                    break;
                }
            }
        }
    }
}
