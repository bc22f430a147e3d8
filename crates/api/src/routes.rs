use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crawldeck_engine::{BatchSweeper, HealthSampler, StuckTaskRepairer};
use crawldeck_realtime::Broadcaster;

use crate::handlers::connections::{clear_connection_stats, get_connections};
use crate::handlers::health::{get_system_health, get_system_performance};
use crate::handlers::system::{
    check_consistency, fix_project_stats, fix_task_stats, get_consistency_report,
};
use crate::ws::ws_handler;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub sweeper: Arc<BatchSweeper>,
    pub sampler: Arc<HealthSampler>,
    pub repairer: Arc<StuckTaskRepairer>,
    pub broadcaster: Arc<Broadcaster>,
}

/// 创建API路由
pub fn create_routes(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        // 一致性管理
        .route("/api/system/check-consistency", post(check_consistency))
        .route("/api/projects/{project_id}/fix-stats", post(fix_project_stats))
        .route("/api/tasks/{task_id}/fix-stats", post(fix_task_stats))
        .route("/api/system/consistency-report", get(get_consistency_report))
        // 系统监控
        .route("/api/system/health", get(get_system_health))
        .route("/api/system/performance", get(get_system_performance))
        // 实时连接管理
        .route("/api/system/connections", get(get_connections))
        .route("/api/system/connections/stats", delete(clear_connection_stats))
        // WebSocket接入
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
