use async_trait::async_trait;

use crate::errors::EngineResult;
use crate::models::DependencyStatus;

/// 进程存活探测
///
/// 以任务 id 是否出现在某个存活进程的命令行里作判据。这个手段天然有竞态，
/// 故收敛在一个窄接口后面，便于换成 worker 自报心跳之类更可靠的机制。
/// 探测超时返回 Err，调用方把它当作"未知"而不是"进程已死"。
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    async fn is_task_process_alive(&self, task_id: &str) -> EngineResult<bool>;
}

/// 依赖服务可达性探测，带显式超时；超时算不可达，不算错误
#[async_trait]
pub trait DependencyProber: Send + Sync {
    async fn probe(&self, name: &str, url: &str) -> DependencyStatus;
}
