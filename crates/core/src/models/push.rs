use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 推送消息种类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PushKind {
    #[serde(rename = "task_update")]
    TaskUpdate,
    #[serde(rename = "monitoring_alert")]
    MonitoringAlert,
    #[serde(rename = "cache_clear")]
    CacheClear,
}

/// 推送给在线客户端的 JSON 信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: PushKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl PushMessage {
    pub fn task_update(task_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: PushKind::TaskUpdate,
            task_id: Some(task_id.into()),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn alert(data: Value) -> Self {
        Self {
            kind: PushKind::MonitoringAlert,
            task_id: None,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn cache_clear() -> Self {
        Self {
            kind: PushKind::CacheClear,
            task_id: None,
            data: Value::Null,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let msg = PushMessage::task_update("t1", json!({"status": "FINISHED"}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "task_update");
        assert_eq!(value["task_id"], "t1");
        assert_eq!(value["data"]["status"], "FINISHED");
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_alert_has_no_task_id() {
        let msg = PushMessage::alert(json!({"message": "cpu high"}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "monitoring_alert");
        assert!(value.get("task_id").is_none());
    }
}
