use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crawldeck_core::traits::{ResultRowCounter, TaskRepository};
use crawldeck_core::{EngineError, EngineResult, Task, TaskStatus};
use crawldeck_infrastructure::ResultLocator;
use crawldeck_realtime::Broadcaster;

/// 对账时各来源给出的计数
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReconcileSources {
    pub db_rows: i64,
    pub file_max: i64,
    pub task_current: i64,
}

/// 单个任务的对账结论
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub task_id: String,
    pub fixed: bool,
    pub old: i64,
    pub new: i64,
    pub sources: ReconcileSources,
}

/// 统计对账器
///
/// 三个独立漂移的事实来源（任务行、结果表行数、磁盘结果文件）之间取最大值
/// 作为权威计数，仅在与任务行不一致时落一次原子写。从不改动任务状态。
pub struct StatisticsReconciler {
    task_repo: Arc<dyn TaskRepository>,
    row_counter: Arc<dyn ResultRowCounter>,
    locator: Arc<ResultLocator>,
    broadcaster: Arc<Broadcaster>,
    short_task_floor_seconds: i64,
}

impl StatisticsReconciler {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        row_counter: Arc<dyn ResultRowCounter>,
        locator: Arc<ResultLocator>,
        broadcaster: Arc<Broadcaster>,
        short_task_floor_seconds: i64,
    ) -> Self {
        Self {
            task_repo,
            row_counter,
            locator,
            broadcaster,
            short_task_floor_seconds,
        }
    }

    /// 对账一个任务，必要时抬升 item_count 并推送更新
    ///
    /// 幂等：没有新数据时第二次调用得到 fixed = false。
    pub async fn reconcile(&self, task_id: &str) -> EngineResult<ReconcileOutcome> {
        let task = self
            .task_repo
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound {
                id: task_id.to_string(),
            })?;

        let db_rows = self.row_counter.count_rows(task_id).await?;
        let file_max = self
            .locator
            .locate(task_id, Some(&task.project_id))
            .max_count;

        let sources = ReconcileSources {
            db_rows,
            file_max,
            task_current: task.item_count,
        };

        let mut authoritative = db_rows.max(file_max).max(task.item_count);
        authoritative = apply_short_task_floor(authoritative, &task, self.short_task_floor_seconds);

        if authoritative == task.item_count {
            debug!("任务 {} 计数一致 ({})，无须修正", task_id, authoritative);
            return Ok(ReconcileOutcome {
                task_id: task_id.to_string(),
                fixed: false,
                old: task.item_count,
                new: task.item_count,
                sources,
            });
        }

        let fixed = self.task_repo.set_item_count(task_id, authoritative).await?;
        if fixed {
            info!(
                "任务 {} 计数修正: {} -> {} (行数 {}, 文件 {})",
                task_id, task.item_count, authoritative, db_rows, file_max
            );
            self.broadcaster
                .push_task_update(
                    task_id,
                    json!({
                        "status": task.status,
                        "item_count": authoritative,
                    }),
                )
                .await;
        }

        Ok(ReconcileOutcome {
            task_id: task_id.to_string(),
            fixed,
            old: task.item_count,
            new: authoritative,
            sources,
        })
    }
}

/// 短任务零结果托底
///
/// 权威计数为零、任务已 Finished 且时长低于阈值时补为 1：这类"零条目成功"
/// 更可能是埋点缺口而不是真空跑。已知的启发式补丁，阈值可配置。
pub fn apply_short_task_floor(authoritative: i64, task: &Task, floor_seconds: i64) -> i64 {
    if authoritative == 0
        && task.status == TaskStatus::Finished
        && task
            .duration()
            .is_some_and(|d| d.num_seconds() < floor_seconds)
    {
        return 1;
    }
    authoritative
}
