use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

use crawldeck_engine::{ReconcileOutcome, SweepReport};

/// 立即执行一轮全量一致性巡检
pub async fn check_consistency(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<SweepReport>> {
    info!("收到手动一致性巡检请求");
    let report = state.sweeper.run_now().await;
    Ok(ApiResponse::success(report))
}

/// 修复指定项目的统计
pub async fn fix_project_stats(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<ApiResponse<SweepReport>> {
    info!("收到项目 {} 的统计修复请求", project_id);
    let report = state.sweeper.sweep_project(&project_id).await;
    Ok(ApiResponse::success(report))
}

/// 修复单个任务的统计
pub async fn fix_task_stats(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<ApiResponse<ReconcileOutcome>> {
    info!("收到任务 {} 的统计修复请求", task_id);
    let outcome = state.sweeper.sweep_task(&task_id).await?;
    Ok(ApiResponse::success(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub days: Option<i64>,
}

/// 查询巡检历史报告
pub async fn get_consistency_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<ApiResponse<Vec<SweepReport>>> {
    let reports = match query.days {
        Some(days) if days <= 0 => {
            return Err(ApiError::BadRequest("days 必须为正数".to_string()));
        }
        Some(days) => state.sweeper.report(days).await,
        None => state.sweeper.report_default().await,
    };
    Ok(ApiResponse::success(reports))
}
