use std::fs;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use crawldeck_core::config::{RealtimeConfig, ResultsConfig};
use crawldeck_core::traits::TaskRepository;
use crawldeck_core::{EngineError, TaskStatus};
use crawldeck_engine::StatisticsReconciler;
use crawldeck_infrastructure::ResultLocator;
use crawldeck_realtime::Broadcaster;
use crawldeck_testing_utils::{
    MockRowCounter, MockTaskRepository, RecordingSubscriber, TaskBuilder,
};

struct Fixture {
    repo: Arc<MockTaskRepository>,
    rows: Arc<MockRowCounter>,
    broadcaster: Arc<Broadcaster>,
    reconciler: StatisticsReconciler,
    _dir: TempDir,
    base: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let base = dir.path().to_path_buf();
    let results = ResultsConfig {
        base_dir: base.to_string_lossy().to_string(),
        ..ResultsConfig::default()
    };
    let repo = Arc::new(MockTaskRepository::new());
    let rows = Arc::new(MockRowCounter::new());
    let broadcaster = Arc::new(Broadcaster::new(RealtimeConfig::default()));
    let reconciler = StatisticsReconciler::new(
        repo.clone(),
        rows.clone(),
        Arc::new(ResultLocator::new(&results)),
        broadcaster.clone(),
        10,
    );
    Fixture {
        repo,
        rows,
        broadcaster,
        reconciler,
        _dir: dir,
        base,
    }
}

fn write_jsonl(fx: &Fixture, project: &str, task: &str, lines: usize) {
    let dir = fx.base.join(project);
    fs::create_dir_all(&dir).unwrap();
    let content: String = (0..lines).map(|i| format!("{{\"n\":{i}}}\n")).collect();
    fs::write(dir.join(format!("{task}.jsonl")), content).unwrap();
}

#[tokio::test]
async fn test_reconcile_takes_max_of_sources() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Finished)
            .with_item_count(0)
            .build(),
    );
    fx.rows.set_count("t1", 120);
    write_jsonl(&fx, "p1", "t1", 150);

    let outcome = fx.reconciler.reconcile("t1").await.unwrap();
    assert!(outcome.fixed);
    assert_eq!(outcome.old, 0);
    assert_eq!(outcome.new, 150);
    assert_eq!(outcome.sources.db_rows, 120);
    assert_eq!(outcome.sources.file_max, 150);

    let task = fx.repo.get_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.item_count, 150);
    assert!(task.request_count >= 150);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Finished)
            .build(),
    );
    fx.rows.set_count("t1", 42);

    let first = fx.reconciler.reconcile("t1").await.unwrap();
    assert!(first.fixed);
    assert_eq!(first.new, 42);

    let second = fx.reconciler.reconcile("t1").await.unwrap();
    assert!(!second.fixed);
    assert_eq!(second.old, 42);
    assert_eq!(second.new, 42);
}

#[tokio::test]
async fn test_reconcile_never_decreases_count() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Finished)
            .with_item_count(500)
            .with_request_count(500)
            .build(),
    );
    fx.rows.set_count("t1", 10);

    let outcome = fx.reconciler.reconcile("t1").await.unwrap();
    assert!(!outcome.fixed);
    assert_eq!(
        fx.repo.get_by_id("t1").await.unwrap().unwrap().item_count,
        500
    );
}

#[tokio::test]
async fn test_reconcile_unknown_task() {
    let fx = fixture();
    let err = fx.reconciler.reconcile("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::TaskNotFound { .. }));
}

#[tokio::test]
async fn test_reconcile_never_touches_status() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Running)
            .build(),
    );
    fx.rows.set_count("t1", 9);

    fx.reconciler.reconcile("t1").await.unwrap();
    let task = fx.repo.get_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.item_count, 9);
}

#[tokio::test]
async fn test_short_task_floor_lifts_zero_to_one() {
    let fx = fixture();
    let started = Utc::now() - Duration::seconds(30);
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Finished)
            .with_started_at(started)
            .with_finished_at(started + Duration::seconds(3))
            .build(),
    );

    let outcome = fx.reconciler.reconcile("t1").await.unwrap();
    assert!(outcome.fixed);
    assert_eq!(outcome.new, 1);
}

#[tokio::test]
async fn test_fix_pushes_task_update_to_subscribers() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Finished)
            .build(),
    );
    fx.rows.set_count("t1", 7);

    let subscriber = Arc::new(RecordingSubscriber::new());
    let conn = fx.broadcaster.register(subscriber.clone()).await;
    fx.broadcaster.subscribe_task(conn, "t1").await;

    fx.reconciler.reconcile("t1").await.unwrap();

    let sent = subscriber.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("task_update"));
    assert!(sent[0].contains("\"item_count\":7"));
}
