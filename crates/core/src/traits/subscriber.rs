use async_trait::async_trait;

use crate::errors::EngineResult;

/// 一条在线客户端连接的发送端
///
/// 由 WebSocket 适配层（或测试替身）实现；Broadcaster 只通过它投递序列化好的
/// JSON 信封，失败与否由返回值表达。
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send_text(&self, payload: String) -> EngineResult<()>;
}
