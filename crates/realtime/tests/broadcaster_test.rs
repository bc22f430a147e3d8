use std::sync::Arc;

use serde_json::json;

use crawldeck_core::config::RealtimeConfig;
use crawldeck_realtime::Broadcaster;
use crawldeck_testing_utils::{FailingSubscriber, RecordingSubscriber};

fn fast_config() -> RealtimeConfig {
    RealtimeConfig {
        send_backoff_ms: 1,
        ..RealtimeConfig::default()
    }
}

#[tokio::test]
async fn test_task_update_reaches_only_task_subscribers() {
    let broadcaster = Broadcaster::new(fast_config());

    let wanted = Arc::new(RecordingSubscriber::new());
    let other = Arc::new(RecordingSubscriber::new());
    let conn_a = broadcaster.register(wanted.clone()).await;
    let conn_b = broadcaster.register(other.clone()).await;
    broadcaster.subscribe_task(conn_a, "t1").await;
    broadcaster.subscribe_task(conn_b, "t2").await;

    broadcaster
        .push_task_update("t1", json!({"item_count": 5}))
        .await;

    assert_eq!(wanted.sent().len(), 1);
    assert!(wanted.sent()[0].contains("\"task_id\":\"t1\""));
    assert!(other.sent().is_empty());
}

#[tokio::test]
async fn test_alert_reaches_global_subscribers() {
    let broadcaster = Broadcaster::new(fast_config());

    let global = Arc::new(RecordingSubscriber::new());
    let task_only = Arc::new(RecordingSubscriber::new());
    let conn_a = broadcaster.register(global.clone()).await;
    let conn_b = broadcaster.register(task_only.clone()).await;
    broadcaster.subscribe_global(conn_a).await;
    broadcaster.subscribe_task(conn_b, "t1").await;

    broadcaster.push_alert(json!({"message": "cpu high"})).await;

    assert_eq!(global.sent().len(), 1);
    assert!(global.sent()[0].contains("monitoring_alert"));
    assert!(task_only.sent().is_empty());
}

#[tokio::test]
async fn test_failing_subscriber_is_retried_then_evicted() {
    let broadcaster = Broadcaster::new(fast_config());

    let failing = Arc::new(FailingSubscriber::new());
    let conn = broadcaster.register(failing.clone()).await;
    broadcaster.subscribe_task(conn, "t1").await;
    broadcaster.subscribe_global(conn).await;

    broadcaster.push_task_update("t1", json!({})).await;

    assert_eq!(failing.attempt_count(), 3);
    let stats = broadcaster.stats().await;
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.connections_evicted, 1);
    assert_eq!(stats.messages_failed, 1);
    assert!(stats.task_subscriptions.is_empty());
    assert_eq!(stats.global_subscriptions, 0);

    // 后续推送不再找它
    broadcaster.push_task_update("t1", json!({})).await;
    assert_eq!(failing.attempt_count(), 3);
}

#[tokio::test]
async fn test_failure_of_one_connection_does_not_block_others() {
    let broadcaster = Broadcaster::new(fast_config());

    let healthy = Arc::new(RecordingSubscriber::new());
    let failing = Arc::new(FailingSubscriber::new());
    let conn_a = broadcaster.register(healthy.clone()).await;
    let conn_b = broadcaster.register(failing.clone()).await;
    broadcaster.subscribe_task(conn_a, "t1").await;
    broadcaster.subscribe_task(conn_b, "t1").await;

    broadcaster.push_task_update("t1", json!({"n": 1})).await;

    assert_eq!(healthy.sent().len(), 1);
    let stats = broadcaster.stats().await;
    assert_eq!(stats.active_connections, 1);
    assert_eq!(stats.messages_sent, 1);
}

#[tokio::test]
async fn test_unsubscribe_and_disconnect_clean_up() {
    let broadcaster = Broadcaster::new(fast_config());

    let subscriber = Arc::new(RecordingSubscriber::new());
    let conn = broadcaster.register(subscriber.clone()).await;
    broadcaster.subscribe_task(conn, "t1").await;
    broadcaster.unsubscribe(conn, "t1").await;

    broadcaster.push_task_update("t1", json!({})).await;
    assert!(subscriber.sent().is_empty());

    broadcaster.disconnect(conn).await;
    assert_eq!(broadcaster.stats().await.active_connections, 0);
}

#[tokio::test]
async fn test_cache_clear_goes_to_global_subscribers() {
    let broadcaster = Broadcaster::new(fast_config());

    let subscriber = Arc::new(RecordingSubscriber::new());
    let conn = broadcaster.register(subscriber.clone()).await;
    broadcaster.subscribe_global(conn).await;

    broadcaster.push_cache_clear().await;

    assert_eq!(subscriber.sent().len(), 1);
    assert!(subscriber.sent()[0].contains("cache_clear"));
}

#[tokio::test]
async fn test_health_verdict_thresholds() {
    let broadcaster = Broadcaster::new(fast_config());
    // 没有任何连接
    assert_eq!(broadcaster.health_verdict().await, "warning");

    let healthy = Arc::new(RecordingSubscriber::new());
    let conn = broadcaster.register(healthy.clone()).await;
    broadcaster.subscribe_task(conn, "t1").await;
    broadcaster.push_task_update("t1", json!({})).await;
    assert_eq!(broadcaster.health_verdict().await, "ok");

    // 大量失败把失败率推过一成
    let failing = Arc::new(FailingSubscriber::new());
    let conn_b = broadcaster.register(failing).await;
    broadcaster.subscribe_task(conn_b, "t1").await;
    broadcaster.push_task_update("t1", json!({})).await;
    assert_eq!(broadcaster.health_verdict().await, "error");

    broadcaster.clear_stats();
    assert_eq!(broadcaster.health_verdict().await, "ok");
}

#[tokio::test]
async fn test_sweep_stale_with_no_traffic() {
    let config = RealtimeConfig {
        stale_timeout_seconds: 0,
        ..fast_config()
    };
    let broadcaster = Broadcaster::new(config);

    let subscriber = Arc::new(RecordingSubscriber::new());
    broadcaster.register(subscriber).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let swept = broadcaster.sweep_stale().await;
    assert_eq!(swept, 1);
    assert_eq!(broadcaster.stats().await.active_connections, 0);
}
