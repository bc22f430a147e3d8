pub mod models;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use models::{
    ApiConfig, DatabaseConfig, DependencyEndpoint, EventBusConfig, HealthConfig, RealtimeConfig,
    ReconcilerConfig, RepairerConfig, ResultsConfig, SweeperConfig,
};

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub event_bus: EventBusConfig,
    pub results: ResultsConfig,
    pub reconciler: ReconcilerConfig,
    pub sweeper: SweeperConfig,
    pub repairer: RepairerConfig,
    pub health: HealthConfig,
    pub realtime: RealtimeConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// 加载配置
    ///
    /// 顺序：默认值 -> TOML 配置文件 -> 环境变量覆盖（前缀 CRAWLDECK_）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CRAWLDECK")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("解析配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 配置合法性检查
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.database.url.is_empty(), "数据库 URL 不能为空");
        anyhow::ensure!(
            self.database.max_connections >= self.database.min_connections,
            "数据库最大连接数不能小于最小连接数"
        );
        anyhow::ensure!(
            !self.event_bus.redis_url.is_empty(),
            "redis URL 不能为空"
        );
        anyhow::ensure!(
            !self.results.path_templates.is_empty(),
            "结果路径模板不能为空"
        );
        anyhow::ensure!(
            self.results
                .path_templates
                .iter()
                .all(|t| t.contains("{task}")),
            "每个结果路径模板都必须包含 {{task}} 占位符"
        );
        anyhow::ensure!(
            self.reconciler.short_task_floor_seconds >= 0,
            "短任务托底阈值不能为负"
        );
        anyhow::ensure!(
            self.repairer.batch_limit > 0,
            "修复批次上限必须为正"
        );
        anyhow::ensure!(
            self.realtime.send_max_attempts > 0,
            "推送重试次数必须为正"
        );
        anyhow::ensure!(!self.api.bind_address.is_empty(), "API 监听地址不能为空");
        Ok(())
    }
}
