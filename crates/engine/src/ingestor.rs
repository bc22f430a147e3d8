use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crawldeck_core::config::EventBusConfig;
use crawldeck_core::models::{EventKind, LifecycleEvent, ALL_CHANNELS};
use crawldeck_core::traits::{EventBus, TaskRepository};
use crawldeck_core::{EngineResult, Task, TaskStatus};
use crawldeck_realtime::Broadcaster;

/// 完成事件的判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishVerdict {
    pub status: TaskStatus,
    pub annotation: Option<String>,
}

/// 完成事件的状态判定
///
/// 退出码为零且有条目才算成功；退出码为零但零条目的"成功"更可能是
/// 反爬拦截或选择器失效，统一判失败并留注释。独立成函数便于单测。
pub fn classify_finish(return_code: Option<i32>, items_count: i64) -> FinishVerdict {
    match return_code {
        Some(0) | None if items_count > 0 => FinishVerdict {
            status: TaskStatus::Finished,
            annotation: None,
        },
        Some(0) | None => FinishVerdict {
            status: TaskStatus::Failed,
            annotation: Some("进程正常退出但零条目，判为失败".to_string()),
        },
        Some(code) => FinishVerdict {
            status: TaskStatus::Failed,
            annotation: Some(format!("进程异常退出，退出码 {code}")),
        },
    }
}

/// 生命周期事件消费器
///
/// 轮询四个事件通道，把 worker 的生命周期上报落到任务行。投递可能
/// 重复、乱序，所有处理都幂等；单条畸形消息只丢弃不中断循环。
pub struct EventIngestor {
    task_repo: Arc<dyn TaskRepository>,
    event_bus: Arc<dyn EventBus>,
    broadcaster: Arc<Broadcaster>,
    config: EventBusConfig,
}

impl EventIngestor {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        event_bus: Arc<dyn EventBus>,
        broadcaster: Arc<Broadcaster>,
        config: EventBusConfig,
    ) -> Self {
        Self {
            task_repo,
            event_bus,
            broadcaster,
            config,
        }
    }

    /// 消费循环；通道传输错误按指数退避重试
    pub async fn run_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        info!("事件消费循环启动，订阅 {} 个通道", ALL_CHANNELS.len());
        let mut backoff_seconds = self.config.reconnect_backoff_seconds;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("事件消费循环收到停止信号");
                    break;
                }
                consumed = self.drain_all_channels() => {
                    match consumed {
                        Ok(_) => {
                            backoff_seconds = self.config.reconnect_backoff_seconds;
                            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                        }
                        Err(e) => {
                            let jitter_ms = rand::rng().random_range(0..500);
                            warn!(
                                "事件通道消费失败，{} 秒后重试: {}",
                                backoff_seconds, e
                            );
                            tokio::time::sleep(
                                Duration::from_secs(backoff_seconds)
                                    + Duration::from_millis(jitter_ms),
                            )
                            .await;
                            backoff_seconds =
                                (backoff_seconds * 2).min(self.config.max_backoff_seconds);
                        }
                    }
                }
            }
        }
    }

    /// 轮询一遍全部通道，返回处理的消息总数
    pub async fn drain_all_channels(&self) -> EngineResult<usize> {
        let mut handled = 0;
        for channel in ALL_CHANNELS {
            let payloads = self.event_bus.consume(channel).await?;
            let kind = match EventKind::from_channel(channel) {
                Some(kind) => kind,
                None => continue,
            };
            for payload in payloads {
                // 单条消息的错误边界：解析或落库失败只记日志
                match LifecycleEvent::parse(kind, &payload) {
                    Some(event) => {
                        if let Err(e) = self.handle(&event).await {
                            warn!("事件处理失败 ({:?}, 任务 {}): {}", kind, event.task_id, e);
                        }
                        handled += 1;
                    }
                    None => {
                        warn!("丢弃畸形事件 ({}): {}", channel, payload);
                    }
                }
            }
        }
        Ok(handled)
    }

    /// 分发单条事件
    pub async fn handle(&self, event: &LifecycleEvent) -> EngineResult<()> {
        let task = match self.task_repo.get_by_id(&event.task_id).await? {
            Some(task) => task,
            None => {
                warn!("丢弃未知任务的事件: {}", event.task_id);
                return Ok(());
            }
        };

        match event.kind {
            EventKind::Started => self.handle_started(event, task.status).await,
            EventKind::Progress => self.handle_progress(event).await,
            EventKind::Finished => self.handle_finished(event, &task).await,
            EventKind::ResultsProcessed => self.handle_results_processed(event).await,
        }
    }

    async fn handle_started(&self, event: &LifecycleEvent, current: TaskStatus) -> EngineResult<()> {
        // 重复投递或迟到的 started 不回退已推进的状态
        if current != TaskStatus::Pending {
            debug!("任务 {} 已处于 {}，忽略 started 事件", event.task_id, current);
            return Ok(());
        }
        self.task_repo
            .update_status(&event.task_id, TaskStatus::Running)
            .await?;
        info!("任务 {} 开始运行", event.task_id);
        self.push_update(&event.task_id, TaskStatus::Running, None).await;
        Ok(())
    }

    async fn handle_progress(&self, event: &LifecycleEvent) -> EngineResult<()> {
        let count = event.items_count.unwrap_or(0);
        if count <= 0 {
            return Ok(());
        }
        if self.task_repo.set_item_count(&event.task_id, count).await? {
            debug!("任务 {} 进度更新: {} 条", event.task_id, count);
            self.push_update(&event.task_id, TaskStatus::Running, Some(count))
                .await;
        }
        Ok(())
    }

    async fn handle_finished(&self, event: &LifecycleEvent, task: &Task) -> EngineResult<()> {
        let items = event.items_count.unwrap_or(0);
        let verdict = classify_finish(event.return_code, items);

        // 迟到的 finished 不得把已取消等终态任务拉回来；同状态重放仍然收敛
        if let Err(err) = task.ensure_transition(verdict.status) {
            warn!("丢弃迟到的 finished 事件（任务 {}）: {}", event.task_id, err);
            return Ok(());
        }

        if items > 0 {
            self.task_repo.set_item_count(&event.task_id, items).await?;
        }
        self.task_repo
            .update_status(&event.task_id, verdict.status)
            .await?;
        if let Some(annotation) = &verdict.annotation {
            self.task_repo.set_error(&event.task_id, annotation).await?;
        }

        info!(
            "任务 {} 收尾: {} ({} 条, 退出码 {:?})",
            event.task_id, verdict.status, items, event.return_code
        );
        self.push_update(&event.task_id, verdict.status, Some(items))
            .await;
        Ok(())
    }

    /// 结果后处理完成：只抬计数，从不改状态
    async fn handle_results_processed(&self, event: &LifecycleEvent) -> EngineResult<()> {
        let stats = match &event.stats {
            Some(stats) => stats,
            None => return Ok(()),
        };

        if let Some(duplicates) = stats.get("duplicates_removed").and_then(Value::as_i64) {
            if duplicates > 0 {
                info!("任务 {} 去重移除 {} 条", event.task_id, duplicates);
            }
        }

        let count = stats
            .get("items_count")
            .and_then(Value::as_i64)
            .or(event.items_count)
            .unwrap_or(0);
        if count > 0 && self.task_repo.set_item_count(&event.task_id, count).await? {
            self.broadcaster
                .push_task_update(&event.task_id, json!({ "item_count": count }))
                .await;
        }
        Ok(())
    }

    async fn push_update(&self, task_id: &str, status: TaskStatus, item_count: Option<i64>) {
        let mut data = json!({ "status": status });
        if let Some(count) = item_count {
            data["item_count"] = json!(count);
        }
        self.broadcaster.push_task_update(task_id, data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success_with_items() {
        let verdict = classify_finish(Some(0), 37);
        assert_eq!(verdict.status, TaskStatus::Finished);
        assert!(verdict.annotation.is_none());
    }

    #[test]
    fn test_classify_zero_items_success_is_failed() {
        let verdict = classify_finish(Some(0), 0);
        assert_eq!(verdict.status, TaskStatus::Failed);
        assert!(verdict.annotation.is_some());
    }

    #[test]
    fn test_classify_nonzero_return_code() {
        let verdict = classify_finish(Some(137), 12);
        assert_eq!(verdict.status, TaskStatus::Failed);
        assert!(verdict.annotation.unwrap().contains("137"));
    }

    #[test]
    fn test_classify_missing_return_code_falls_back_to_items() {
        assert_eq!(classify_finish(None, 5).status, TaskStatus::Finished);
        assert_eq!(classify_finish(None, 0).status, TaskStatus::Failed);
    }
}
