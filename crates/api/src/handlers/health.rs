use axum::extract::State;
use serde::Serialize;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

use crawldeck_core::HealthSnapshot;
use crawldeck_realtime::ConnectionStats;

/// 推送面与自愈面的性能概览
#[derive(Debug, Serialize)]
pub struct PerformanceReport {
    pub broadcaster_verdict: &'static str,
    pub connections: ConnectionStats,
    pub stuck_tasks_repaired: u64,
    pub snapshots_retained: usize,
}

/// 当前健康快照；还没有快照时现场采一次
pub async fn get_system_health(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<HealthSnapshot>> {
    let snapshot = match state.sampler.current().await {
        Some(snapshot) => snapshot,
        None => state.sampler.check_once().await,
    };
    Ok(ApiResponse::success(snapshot))
}

/// 性能概览
pub async fn get_system_performance(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<PerformanceReport>> {
    let report = PerformanceReport {
        broadcaster_verdict: state.broadcaster.health_verdict().await,
        connections: state.broadcaster.stats().await,
        stuck_tasks_repaired: state.repairer.total_repaired(),
        snapshots_retained: state.sampler.history().await.len(),
    };
    Ok(ApiResponse::success(report))
}
