use serde::{Deserialize, Serialize};

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/crawldeck".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

/// 事件总线（redis pub/sub）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub redis_url: String,
    /// 消费循环空转时的休眠（毫秒）
    pub poll_interval_ms: u64,
    /// 重连退避起点（秒）
    pub reconnect_backoff_seconds: u64,
    /// 退避上限（秒）
    pub max_backoff_seconds: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            poll_interval_ms: 100,
            reconnect_backoff_seconds: 1,
            max_backoff_seconds: 30,
        }
    }
}

/// 结果文件定位配置
///
/// path_templates 支持 {project}/{task} 占位符；目录命名约定是从线上布局
/// 归纳出来的清单，保持可配置而非写死。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub base_dir: String,
    pub path_templates: Vec<String>,
    /// XML 结果中计数的重复元素标签
    pub xml_item_tag: String,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            base_dir: "/data/results".to_string(),
            path_templates: vec![
                "{project}/{task}".to_string(),
                "{task}".to_string(),
                "results_{task}".to_string(),
            ],
            xml_item_tag: "item".to_string(),
        }
    }
}

/// 统计对账配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// 短任务零结果托底：时长低于该阈值的零条目 Finished 任务计数补为 1
    pub short_task_floor_seconds: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            short_task_floor_seconds: 10,
        }
    }
}

/// 批量巡检配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// 全量巡检回溯窗口（小时）
    pub window_hours: i64,
    /// 报表默认回溯窗口（天）
    pub report_window_days: i64,
    /// 历史报告保留条数
    pub history_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            window_hours: 24,
            report_window_days: 7,
            history_size: 50,
        }
    }
}

/// 卡死任务修复配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// Running 超时阈值（分钟）
    pub running_timeout_minutes: i64,
    /// Pending 超时阈值（分钟）
    pub pending_timeout_minutes: i64,
    /// 每轮每类处理上限，约束单轮时延
    pub batch_limit: i64,
}

impl Default for RepairerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            running_timeout_minutes: 60,
            pending_timeout_minutes: 30,
            batch_limit: 20,
        }
    }
}

/// 健康采样的依赖端点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEndpoint {
    pub name: String,
    pub url: String,
}

/// 健康采样配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// 完整检查周期（秒）
    pub check_interval_seconds: u64,
    /// 资源指标采样周期（秒）
    pub metrics_interval_seconds: u64,
    /// 完整性巡检周期（秒）
    pub integrity_interval_seconds: u64,
    pub cpu_threshold_percent: f64,
    pub mem_threshold_percent: f64,
    pub disk_threshold_percent: f64,
    pub max_running_tasks: i64,
    pub max_recent_failures: i64,
    /// 完整性巡检每轮采样的零条目任务数
    pub integrity_sample_size: i64,
    pub history_size: usize,
    pub probe_timeout_seconds: u64,
    pub dependencies: Vec<DependencyEndpoint>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 60,
            metrics_interval_seconds: 300,
            integrity_interval_seconds: 600,
            cpu_threshold_percent: 80.0,
            mem_threshold_percent: 85.0,
            disk_threshold_percent: 90.0,
            max_running_tasks: 10,
            max_recent_failures: 5,
            integrity_sample_size: 20,
            history_size: 100,
            probe_timeout_seconds: 5,
            dependencies: Vec::new(),
        }
    }
}

/// 实时推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub send_max_attempts: u32,
    /// 线性退避步长（毫秒）
    pub send_backoff_ms: u64,
    /// 连接静默多久视为失联（秒）
    pub stale_timeout_seconds: i64,
    pub sweep_interval_seconds: u64,
    /// 超出即在健康评级中报 warning
    pub max_connections: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            send_max_attempts: 3,
            send_backoff_ms: 100,
            stale_timeout_seconds: 300,
            sweep_interval_seconds: 60,
            max_connections: 500,
        }
    }
}

/// 管理 API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
        }
    }
}
