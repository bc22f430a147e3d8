use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crawldeck_core::config::EventBusConfig;
use crawldeck_core::traits::EventBus;
use crawldeck_core::{EngineError, EngineResult};

type ChannelBuffers = Arc<Mutex<HashMap<String, VecDeque<Value>>>>;

/// 每通道缓冲上限，防止消费端停摆时无限膨胀
const BUFFER_CAP: usize = 10_000;

/// redis pub/sub 事件总线
///
/// 后台任务独占订阅连接，把收到的负载按通道缓冲；consume 按通道清空缓冲。
/// 订阅断开后按指数退避（带抖动）重连，消费方感知不到传输层抖动。
pub struct RedisEventBus {
    buffers: ChannelBuffers,
    ping_conn: ConnectionManager,
    reader_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl RedisEventBus {
    /// 连接 redis 并在后台订阅给定通道
    pub async fn connect(config: &EventBusConfig, channels: &[&str]) -> EngineResult<Self> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| EngineError::EventBus(format!("解析 redis URL 失败: {e}")))?;

        let ping_conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| EngineError::EventBus(format!("连接 redis 失败: {e}")))?;

        let buffers: ChannelBuffers = Arc::new(Mutex::new(
            channels
                .iter()
                .map(|c| (c.to_string(), VecDeque::new()))
                .collect(),
        ));

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let reader = SubscriptionReader {
            client,
            channels: channels.iter().map(|c| c.to_string()).collect(),
            buffers: buffers.clone(),
            backoff_start: Duration::from_secs(config.reconnect_backoff_seconds.max(1)),
            backoff_cap: Duration::from_secs(config.max_backoff_seconds.max(1)),
        };
        let handle = tokio::spawn(reader.run(shutdown_rx));

        info!("事件总线已连接，订阅 {} 个通道", channels.len());
        Ok(Self {
            buffers,
            ping_conn,
            reader_handle: Mutex::new(Some(handle)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// 停止后台订阅任务
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.reader_handle.lock().await.take() {
            let _ = handle.await;
        }
        info!("事件总线订阅已停止");
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn consume(&self, channel: &str) -> EngineResult<Vec<Value>> {
        let mut buffers = self.buffers.lock().await;
        Ok(buffers
            .get_mut(channel)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> EngineResult<()> {
        let mut conn = self.ping_conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| EngineError::EventBus(format!("redis PING 失败: {e}")))?;
        Ok(())
    }
}

/// 后台订阅读取器
struct SubscriptionReader {
    client: Client,
    channels: Vec<String>,
    buffers: ChannelBuffers,
    backoff_start: Duration,
    backoff_cap: Duration,
}

impl SubscriptionReader {
    async fn run(self, mut shutdown_rx: tokio::sync::oneshot::Receiver<()>) {
        let mut backoff = self.backoff_start;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("订阅读取器收到停止信号");
                    return;
                }
                result = self.subscribe_and_read() => {
                    match result {
                        Ok(()) => return,
                        Err(e) => {
                            let jitter = {
                                let mut rng = rand::rng();
                                Duration::from_millis(rng.random_range(0..250))
                            };
                            warn!(
                                "订阅中断: {}，{:?} 后重连",
                                e,
                                backoff + jitter
                            );
                            tokio::time::sleep(backoff + jitter).await;
                            backoff = (backoff * 2).min(self.backoff_cap);
                        }
                    }
                }
            }
        }
    }

    async fn subscribe_and_read(&self) -> EngineResult<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| EngineError::EventBus(format!("建立订阅连接失败: {e}")))?;

        for channel in &self.channels {
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| EngineError::EventBus(format!("订阅通道 {channel} 失败: {e}")))?;
        }
        info!("订阅建立成功: {:?}", self.channels);

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let channel = msg.get_channel_name().to_string();
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!("通道 {} 的消息负载不可读，丢弃: {}", channel, e);
                    continue;
                }
            };
            let value: Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(e) => {
                    warn!("通道 {} 的消息不是合法 JSON，丢弃: {}", channel, e);
                    continue;
                }
            };

            let mut buffers = self.buffers.lock().await;
            if let Some(queue) = buffers.get_mut(&channel) {
                if queue.len() >= BUFFER_CAP {
                    error!("通道 {} 缓冲已满，丢弃最旧消息", channel);
                    queue.pop_front();
                }
                queue.push_back(value);
            }
        }

        // 流结束视为连接断开
        Err(EngineError::EventBus("订阅流已结束".to_string()))
    }
}
