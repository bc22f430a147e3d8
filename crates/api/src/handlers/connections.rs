use axum::extract::State;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

use crawldeck_realtime::ConnectionStats;

/// 实时连接与投递计数
pub async fn get_connections(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<ConnectionStats>> {
    Ok(ApiResponse::success(state.broadcaster.stats().await))
}

/// 清零投递计数（连接表不动）
pub async fn clear_connection_stats(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<ConnectionStats>> {
    state.broadcaster.clear_stats();
    Ok(ApiResponse::success(state.broadcaster.stats().await))
}
