use async_trait::async_trait;
use serde_json::Value;

use crate::errors::EngineResult;

/// 生命周期事件的订阅端
///
/// consume 返回自上次调用以来某通道收到的一批负载，空闲时返回空集；
/// 传输层断开由实现自行重连，消费方按周期轮询即可。
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn consume(&self, channel: &str) -> EngineResult<Vec<Value>>;

    /// 轻量连通性探测
    async fn ping(&self) -> EngineResult<()>;
}
