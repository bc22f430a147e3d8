use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crawldeck_core::EngineError;

/// API层错误
///
/// 处理函数统一返回 ApiResult，引擎错误在这里折算成状态码和响应信封，
/// 不会以panic的形式泄露给客户端。
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("引擎错误: {0}")]
    Engine(#[from] EngineError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Engine(EngineError::TaskNotFound { id }) => {
                (StatusCode::NOT_FOUND, format!("任务 {} 不存在", id))
            }
            ApiError::Engine(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("系统内部错误: {}", e),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, format!("请求参数错误: {}", msg))
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("系统内部错误: {}", msg),
            ),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "timestamp": chrono::Utc::now(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_not_found_maps_to_404() {
        let error = ApiError::Engine(EngineError::TaskNotFound {
            id: "t1".to_string(),
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_bad_request_maps_to_400() {
        let error = ApiError::BadRequest("days 必须为正数".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_other_engine_errors_map_to_500() {
        let error = ApiError::Engine(EngineError::EventBus("连接中断".to_string()));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
