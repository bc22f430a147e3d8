use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// level 作为 EnvFilter 的缺省指令，RUST_LOG 优先；format 取 "json" 或 "pretty"。
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(|e| anyhow::anyhow!("初始化JSON日志失败: {e}"))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .map_err(|e| anyhow::anyhow!("初始化日志失败: {e}"))?;
        }
    }

    Ok(())
}
