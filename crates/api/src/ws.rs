use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crawldeck_core::{EngineError, EngineResult, Subscriber};

use crate::routes::AppState;

/// 推送通道的缓冲深度，写满说明客户端消费不过来
const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub task_id: Option<String>,
    #[serde(default)]
    pub global: bool,
}

/// 连接后客户端可发送的订阅控制消息
#[derive(Debug, Deserialize)]
struct ClientAction {
    action: String,
    task_id: Option<String>,
}

/// WebSocket端的Subscriber适配：推送写入出站队列，由socket写循环消费
struct WsSubscriber {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send_text(&self, payload: String) -> EngineResult<()> {
        self.tx
            .try_send(payload)
            .map_err(|e| EngineError::Delivery(format!("出站队列不可用: {e}")))
    }
}

/// WebSocket 接入点
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let conn = state
        .broadcaster
        .register(Arc::new(WsSubscriber { tx }))
        .await;
    if let Some(task_id) = &query.task_id {
        state.broadcaster.subscribe_task(conn, task_id).await;
    }
    if query.global {
        state.broadcaster.subscribe_global(conn).await;
    }
    info!(
        "WebSocket连接 {} 建立 (task: {:?}, global: {})",
        conn, query.task_id, query.global
    );

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    // 连接已被广播器驱逐
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket连接 {} 读取失败: {}", conn, e);
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.disconnect(conn).await;
    info!("WebSocket连接 {} 关闭", conn);
}

async fn handle_client_message(
    state: &AppState,
    conn: crawldeck_realtime::ConnectionId,
    text: &str,
) {
    let action: ClientAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(e) => {
            warn!("丢弃无法解析的客户端消息: {}", e);
            return;
        }
    };

    match (action.action.as_str(), action.task_id) {
        ("subscribe", Some(task_id)) => {
            state.broadcaster.subscribe_task(conn, &task_id).await;
        }
        ("unsubscribe", Some(task_id)) => {
            state.broadcaster.unsubscribe(conn, &task_id).await;
        }
        ("subscribe", None) => {
            state.broadcaster.subscribe_global(conn).await;
        }
        (other, _) => {
            warn!("忽略未知的客户端动作: {}", other);
        }
    }
}
