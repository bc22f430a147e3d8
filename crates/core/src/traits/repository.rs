use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::EngineResult;
use crate::models::{Task, TaskStatus};

/// 任务仓库——引擎唯一的共享可变资源
///
/// 所有写入都是单行单事务的原子更新；item_count 的单调性由实现保证
/// （写入值与现有值取大者），调用方无需读-改-写。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> EngineResult<Option<Task>>;

    /// 更新任务状态
    ///
    /// 进入 Running 时补写 started_at，进入终态时补写 finished_at（均只在为空时）。
    async fn update_status(&self, id: &str, status: TaskStatus) -> EngineResult<()>;

    /// 原子地抬升 item_count（取大者），同时把 request_count 抬升到不低于新值。
    /// 返回是否发生了实际变更。
    async fn set_item_count(&self, id: &str, count: i64) -> EngineResult<bool>;

    /// 记录错误注释并累加 error_count
    async fn set_error(&self, id: &str, message: &str) -> EngineResult<()>;

    /// 查询窗口内创建的已完成任务，可按项目过滤
    async fn find_finished_since(
        &self,
        since: DateTime<Utc>,
        project_id: Option<&str>,
    ) -> EngineResult<Vec<Task>>;

    /// 查询在某状态停留超过时限的任务
    async fn find_stuck(
        &self,
        status: TaskStatus,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> EngineResult<Vec<Task>>;

    /// 完整性巡检的采样：零条目的已完成任务
    async fn find_zero_item_finished(&self, limit: i64) -> EngineResult<Vec<Task>>;

    async fn count_by_status(&self, status: TaskStatus) -> EngineResult<i64>;

    async fn count_failed_since(&self, since: DateTime<Utc>) -> EngineResult<i64>;

    /// 轻量连通性探测
    async fn ping(&self) -> EngineResult<()>;
}

/// 结果表行计数源：count(rows where task_id = X)
#[async_trait]
pub trait ResultRowCounter: Send + Sync {
    async fn count_rows(&self, task_id: &str) -> EngineResult<i64>;
}

/// 调度配置仓库，人口巡检需要确认至少存在一个启用的调度
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn count_active(&self) -> EngineResult<i64>;
}
