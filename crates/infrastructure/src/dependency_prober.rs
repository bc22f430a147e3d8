use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crawldeck_core::traits::DependencyProber;
use crawldeck_core::DependencyStatus;

/// 基于 HTTP GET 的依赖可达性探测
///
/// 超时或连接失败都只是"不可达"的结论，从不向上传播错误。
pub struct HttpDependencyProber {
    client: reqwest::Client,
}

impl HttpDependencyProber {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl DependencyProber for HttpDependencyProber {
    async fn probe(&self, name: &str, url: &str) -> DependencyStatus {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("依赖 {} 可达", name);
                DependencyStatus {
                    name: name.to_string(),
                    healthy: true,
                    detail: None,
                }
            }
            Ok(response) => DependencyStatus {
                name: name.to_string(),
                healthy: false,
                detail: Some(format!("HTTP {}", response.status())),
            },
            Err(e) if e.is_timeout() => DependencyStatus {
                name: name.to_string(),
                healthy: false,
                detail: Some("探测超时".to_string()),
            },
            Err(e) => DependencyStatus {
                name: name.to_string(),
                healthy: false,
                detail: Some(e.to_string()),
            },
        }
    }
}
