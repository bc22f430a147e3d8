use std::sync::Arc;

use tempfile::TempDir;

use crawldeck_core::config::{RealtimeConfig, ResultsConfig, SweeperConfig};
use crawldeck_core::traits::TaskRepository;
use crawldeck_core::{EngineError, TaskStatus};
use crawldeck_engine::{BatchSweeper, StatisticsReconciler};
use crawldeck_infrastructure::ResultLocator;
use crawldeck_realtime::Broadcaster;
use crawldeck_testing_utils::{MockRowCounter, MockTaskRepository, TaskBuilder};

struct Fixture {
    repo: Arc<MockTaskRepository>,
    rows: Arc<MockRowCounter>,
    sweeper: BatchSweeper,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let results = ResultsConfig {
        base_dir: dir.path().to_string_lossy().to_string(),
        ..ResultsConfig::default()
    };
    let repo = Arc::new(MockTaskRepository::new());
    let rows = Arc::new(MockRowCounter::new());
    let reconciler = Arc::new(StatisticsReconciler::new(
        repo.clone(),
        rows.clone(),
        Arc::new(ResultLocator::new(&results)),
        Arc::new(Broadcaster::new(RealtimeConfig::default())),
        10,
    ));
    let sweeper = BatchSweeper::new(repo.clone(), reconciler, SweeperConfig::default());
    Fixture {
        repo,
        rows,
        sweeper,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_project_sweep_fixes_only_drifted_tasks() {
    let fx = fixture();
    for i in 0..10 {
        let id = format!("t{i}");
        fx.repo.insert(
            TaskBuilder::new(&id)
                .with_project("acme")
                .with_status(TaskStatus::Finished)
                .with_item_count(100)
                .with_request_count(100)
                .build(),
        );
        // 三个任务的结果表行数高于任务行计数
        let drifted = i < 3;
        fx.rows.set_count(&id, if drifted { 100 + i + 1 } else { 100 });
    }

    let report = fx.sweeper.sweep_project("acme").await;
    assert_eq!(report.checked, 10);
    assert_eq!(report.fixed, 3);
    assert_eq!(report.errors, 0);
    let project = report.per_project.get("acme").unwrap();
    assert_eq!(project.checked, 10);
    assert_eq!(project.fixed, 3);
}

#[tokio::test]
async fn test_sweep_filters_by_project() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("a1")
            .with_project("acme")
            .with_status(TaskStatus::Finished)
            .with_item_count(5)
            .with_request_count(5)
            .build(),
    );
    fx.repo.insert(
        TaskBuilder::new("b1")
            .with_project("globex")
            .with_status(TaskStatus::Finished)
            .with_item_count(5)
            .with_request_count(5)
            .build(),
    );
    fx.rows.set_count("b1", 50);

    let report = fx.sweeper.sweep_project("acme").await;
    assert_eq!(report.checked, 1);
    assert_eq!(report.fixed, 0);
    // globex 的漂移没被动过
    assert_eq!(fx.repo.get_by_id("b1").await.unwrap().unwrap().item_count, 5);
}

#[tokio::test]
async fn test_sweep_all_counts_across_projects() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("a1")
            .with_project("acme")
            .with_status(TaskStatus::Finished)
            .build(),
    );
    fx.repo.insert(
        TaskBuilder::new("b1")
            .with_project("globex")
            .with_status(TaskStatus::Finished)
            .build(),
    );
    fx.rows.set_count("a1", 10);
    fx.rows.set_count("b1", 20);

    let report = fx.sweeper.sweep_all(chrono::Duration::hours(24)).await;
    assert_eq!(report.checked, 2);
    assert_eq!(report.fixed, 2);
    assert_eq!(report.per_project.len(), 2);
}

#[tokio::test]
async fn test_sweep_task_unknown_id() {
    let fx = fixture();
    let err = fx.sweeper.sweep_task("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::TaskNotFound { .. }));
}

#[tokio::test]
async fn test_sweep_task_returns_outcome() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Finished)
            .build(),
    );
    fx.rows.set_count("t1", 33);

    let outcome = fx.sweeper.sweep_task("t1").await.unwrap();
    assert!(outcome.fixed);
    assert_eq!(outcome.new, 33);
}

#[tokio::test]
async fn test_reports_are_recorded_and_windowed() {
    let fx = fixture();
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Finished)
            .build(),
    );

    fx.sweeper.run_now().await;
    fx.sweeper.run_now().await;

    let reports = fx.sweeper.report(7).await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.checked == 1));
}
