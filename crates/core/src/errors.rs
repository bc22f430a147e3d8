use thiserror::Error;

/// 引擎错误类型定义
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("无效的状态转换: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("事件总线错误: {0}")]
    EventBus(String),

    #[error("结果文件错误: {0}")]
    ResultFile(String),

    #[error("探测超时: {0}")]
    ProbeTimeout(String),

    #[error("推送投递失败: {0}")]
    Delivery(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type EngineResult<T> = std::result::Result<T, EngineError>;
