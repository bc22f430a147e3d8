use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crawldeck_core::config::RealtimeConfig;
use crawldeck_core::{PushMessage, Subscriber};

/// 推送并发扇出上限
const SEND_FANOUT: usize = 32;

pub type ConnectionId = Uuid;

struct ConnectionEntry {
    subscriber: Arc<dyn Subscriber>,
    last_seen: DateTime<Utc>,
}

/// 连接与投递计数
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub connections_evicted: u64,
    pub task_subscriptions: HashMap<String, usize>,
    pub global_subscriptions: usize,
}

/// 实时推送中枢
///
/// 进程启动时构造一次、显式持有并传引用，连接表与订阅表全部收敛在这里，
/// 不走模块级全局状态。多条调度循环会并发读写这些表，因此都在 RwLock 后面。
pub struct Broadcaster {
    config: RealtimeConfig,
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    task_subs: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    global_subs: RwLock<HashSet<ConnectionId>>,
    sent: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
}

impl Broadcaster {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            task_subs: RwLock::new(HashMap::new()),
            global_subs: RwLock::new(HashSet::new()),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// 登记一条新连接，返回连接 id
    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.write().await.insert(
            id,
            ConnectionEntry {
                subscriber,
                last_seen: Utc::now(),
            },
        );
        debug!("连接 {} 已登记", id);
        id
    }

    pub async fn subscribe_task(&self, conn: ConnectionId, task_id: &str) {
        let mut task_subs = self.task_subs.write().await;
        task_subs
            .entry(task_id.to_string())
            .or_default()
            .insert(conn);
        debug!("连接 {} 订阅任务 {}", conn, task_id);
    }

    pub async fn subscribe_global(&self, conn: ConnectionId) {
        self.global_subs.write().await.insert(conn);
        debug!("连接 {} 订阅全局告警", conn);
    }

    pub async fn unsubscribe(&self, conn: ConnectionId, task_id: &str) {
        let mut task_subs = self.task_subs.write().await;
        if let Some(subs) = task_subs.get_mut(task_id) {
            subs.remove(&conn);
            if subs.is_empty() {
                task_subs.remove(task_id);
            }
        }
    }

    /// 断开连接并从所有订阅集中移除
    pub async fn disconnect(&self, conn: ConnectionId) {
        self.connections.write().await.remove(&conn);
        self.global_subs.write().await.remove(&conn);
        let mut task_subs = self.task_subs.write().await;
        task_subs.retain(|_, subs| {
            subs.remove(&conn);
            !subs.is_empty()
        });
        debug!("连接 {} 已断开", conn);
    }

    /// 向任务订阅者推送 task_update
    pub async fn push_task_update(&self, task_id: &str, data: Value) {
        let targets: Vec<ConnectionId> = {
            let task_subs = self.task_subs.read().await;
            match task_subs.get(task_id) {
                Some(subs) => subs.iter().copied().collect(),
                None => return,
            }
        };
        let message = PushMessage::task_update(task_id, data);
        self.deliver(&targets, &message).await;
    }

    /// 向全局订阅者推送告警
    pub async fn push_alert(&self, data: Value) {
        let targets: Vec<ConnectionId> = self.global_subs.read().await.iter().copied().collect();
        let message = PushMessage::alert(data);
        self.deliver(&targets, &message).await;
    }

    /// 通知所有全局订阅者清理本地缓存
    pub async fn push_cache_clear(&self) {
        let targets: Vec<ConnectionId> = self.global_subs.read().await.iter().copied().collect();
        let message = PushMessage::cache_clear();
        self.deliver(&targets, &message).await;
    }

    /// 并发投递；单条连接的退避不会阻塞其他连接
    async fn deliver(&self, targets: &[ConnectionId], message: &PushMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                warn!("推送消息序列化失败: {}", e);
                return;
            }
        };

        let dead: Vec<ConnectionId> = stream::iter(targets.iter().copied())
            .map(|conn| {
                let payload = payload.clone();
                async move {
                    match self.send_with_retry(conn, payload).await {
                        true => None,
                        false => Some(conn),
                    }
                }
            })
            .buffer_unordered(SEND_FANOUT)
            .filter_map(|evict| async move { evict })
            .collect()
            .await;

        for conn in dead {
            warn!("连接 {} 投递重试耗尽，驱逐", conn);
            self.evicted.fetch_add(1, Ordering::Relaxed);
            self.disconnect(conn).await;
        }
    }

    /// 有界重试 + 线性退避；成功刷新 last_seen
    async fn send_with_retry(&self, conn: ConnectionId, payload: String) -> bool {
        let subscriber = {
            let connections = self.connections.read().await;
            match connections.get(&conn) {
                Some(entry) => entry.subscriber.clone(),
                None => return true, // 已被并发移除，不再视为失败
            }
        };

        for attempt in 1..=self.config.send_max_attempts {
            match subscriber.send_text(payload.clone()).await {
                Ok(()) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    if let Some(entry) = self.connections.write().await.get_mut(&conn) {
                        entry.last_seen = Utc::now();
                    }
                    return true;
                }
                Err(e) => {
                    debug!("连接 {} 第 {} 次投递失败: {}", conn, attempt, e);
                    if attempt < self.config.send_max_attempts {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.send_backoff_ms * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
        }

        self.failed.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// 驱逐静默超时的连接
    pub async fn sweep_stale(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.stale_timeout_seconds);
        let stale: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, entry)| entry.last_seen < cutoff)
                .map(|(id, _)| *id)
                .collect()
        };

        for conn in &stale {
            info!("连接 {} 静默超时，驱逐", conn);
            self.evicted.fetch_add(1, Ordering::Relaxed);
            self.disconnect(*conn).await;
        }
        stale.len()
    }

    /// 周期性失联清理循环
    pub async fn run_sweep_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut tick = interval(Duration::from_secs(self.config.sweep_interval_seconds));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let swept = self.sweep_stale().await;
                    if swept > 0 {
                        info!("失联清理驱逐了 {} 条连接", swept);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("失联清理循环收到停止信号");
                    break;
                }
            }
        }
    }

    pub async fn stats(&self) -> ConnectionStats {
        let connections = self.connections.read().await;
        let task_subs = self.task_subs.read().await;
        ConnectionStats {
            active_connections: connections.len(),
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_failed: self.failed.load(Ordering::Relaxed),
            connections_evicted: self.evicted.load(Ordering::Relaxed),
            task_subscriptions: task_subs
                .iter()
                .map(|(task, subs)| (task.clone(), subs.len()))
                .collect(),
            global_subscriptions: self.global_subs.read().await.len(),
        }
    }

    pub fn clear_stats(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.evicted.store(0, Ordering::Relaxed);
    }

    /// 推送面的健康评级
    ///
    /// 失败超过投递量一成报 error；没有连接或连接数超限报 warning。
    pub async fn health_verdict(&self) -> &'static str {
        let sent = self.sent.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = sent + failed;
        if total > 0 && failed as f64 / total as f64 > 0.10 {
            return "error";
        }

        let active = self.connections.read().await.len();
        if active == 0 || active > self.config.max_connections {
            return "warning";
        }
        "ok"
    }
}
