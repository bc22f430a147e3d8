//! 管理API：一致性巡检的手动触发、健康查询与WebSocket实时推送接入。

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod ws;

use anyhow::Context;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};

/// 启动HTTP服务并阻塞到停止信号
pub async fn serve(
    state: AppState,
    bind_address: &str,
    cors_enabled: bool,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let router = create_routes(state, cors_enabled);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("监听地址 {bind_address} 绑定失败"))?;
    info!("管理API已监听 {}", bind_address);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("管理API收到停止信号");
        })
        .await
        .context("HTTP服务异常退出")?;
    Ok(())
}
