use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 依赖服务可达性结论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// 系统健康快照，每个采样周期整体替换
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub dependencies: Vec<DependencyStatus>,
    pub running_tasks: i64,
    pub recent_failed_tasks: i64,
    pub issues: Vec<String>,
    pub auto_repairs: u64,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// 告警级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertLevel {
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
}

/// 推送给全局订阅者的告警
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub source: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warning,
            source: source.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Error,
            source: source.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_health() {
        let snapshot = HealthSnapshot {
            timestamp: Utc::now(),
            hostname: "test".to_string(),
            cpu_percent: 10.0,
            mem_percent: 20.0,
            disk_percent: 30.0,
            dependencies: vec![],
            running_tasks: 0,
            recent_failed_tasks: 0,
            issues: vec![],
            auto_repairs: 0,
        };
        assert!(snapshot.is_healthy());
    }

    #[test]
    fn test_alert_levels() {
        assert_eq!(Alert::warning("health", "x").level, AlertLevel::Warning);
        assert_eq!(Alert::error("health", "x").level, AlertLevel::Error);
    }
}
