use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件通道名
pub const CHANNEL_SPIDER_STARTED: &str = "events:spider_started";
pub const CHANNEL_SPIDER_PROGRESS: &str = "events:spider_progress";
pub const CHANNEL_SPIDER_FINISHED: &str = "events:spider_finished";
pub const CHANNEL_RESULTS_PROCESSED: &str = "events:results_processed";

/// 引擎订阅的全部通道
pub const ALL_CHANNELS: [&str; 4] = [
    CHANNEL_SPIDER_STARTED,
    CHANNEL_SPIDER_PROGRESS,
    CHANNEL_SPIDER_FINISHED,
    CHANNEL_RESULTS_PROCESSED,
];

/// 生命周期事件种类，由通道名决定
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    Started,
    Progress,
    Finished,
    ResultsProcessed,
}

impl EventKind {
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            CHANNEL_SPIDER_STARTED => Some(EventKind::Started),
            CHANNEL_SPIDER_PROGRESS => Some(EventKind::Progress),
            CHANNEL_SPIDER_FINISHED => Some(EventKind::Finished),
            CHANNEL_RESULTS_PROCESSED => Some(EventKind::ResultsProcessed),
            _ => None,
        }
    }
}

/// 外部 worker 发布的生命周期事件
///
/// 不持久化，消费一次即丢弃；投递可能重复、乱序，处理必须幂等。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub task_id: String,
    pub items_count: Option<i64>,
    pub return_code: Option<i32>,
    pub stats: Option<Value>,
}

impl LifecycleEvent {
    /// 从扁平 JSON 负载解析；缺少 task_id 视为畸形消息
    pub fn parse(kind: EventKind, payload: &Value) -> Option<Self> {
        let task_id = payload.get("task_id")?.as_str()?.to_string();
        if task_id.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            task_id,
            items_count: payload.get("items_count").and_then(Value::as_i64),
            return_code: payload
                .get("return_code")
                .and_then(Value::as_i64)
                .map(|c| c as i32),
            stats: payload.get("stats").cloned(),
        })
    }
}
