use std::fs;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use crawldeck_core::config::{RealtimeConfig, RepairerConfig, ResultsConfig};
use crawldeck_core::traits::TaskRepository;
use crawldeck_core::TaskStatus;
use crawldeck_engine::StuckTaskRepairer;
use crawldeck_infrastructure::ResultLocator;
use crawldeck_realtime::Broadcaster;
use crawldeck_testing_utils::{MockProcessProbe, MockTaskRepository, TaskBuilder};

struct Fixture {
    repo: Arc<MockTaskRepository>,
    probe: Arc<MockProcessProbe>,
    repairer: StuckTaskRepairer,
    _dir: TempDir,
    base: std::path::PathBuf,
}

fn fixture(config: RepairerConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let base = dir.path().to_path_buf();
    let results = ResultsConfig {
        base_dir: base.to_string_lossy().to_string(),
        ..ResultsConfig::default()
    };
    let repo = Arc::new(MockTaskRepository::new());
    let probe = Arc::new(MockProcessProbe::new());
    let repairer = StuckTaskRepairer::new(
        repo.clone(),
        probe.clone(),
        Arc::new(ResultLocator::new(&results)),
        Arc::new(Broadcaster::new(RealtimeConfig::default())),
        config,
    );
    Fixture {
        repo,
        probe,
        repairer,
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

fn stuck_running(id: &str, minutes_ago: i64) -> crawldeck_core::Task {
    TaskBuilder::new(id)
        .with_status(TaskStatus::Running)
        .with_started_at(Utc::now() - Duration::minutes(minutes_ago))
        .build()
}

#[tokio::test]
async fn test_dead_process_with_results_finishes_task() {
    let fx = fixture(RepairerConfig::default());
    fx.repo.insert(stuck_running("t1", 90));
    write_jsonl(&fx, "p1", "t1", 42);

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.examined, 1);
    assert_eq!(report.repaired, 1);

    let task = fx.repo.get_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.item_count, 42);
    assert!(task.finished_at.is_some());
    assert!(task.error_message.is_some());
}

#[tokio::test]
async fn test_dead_process_without_results_fails_task() {
    let fx = fixture(RepairerConfig::default());
    fx.repo.insert(stuck_running("t1", 90));

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.repaired, 1);

    let task = fx.repo.get_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.item_count, 0);
}

#[tokio::test]
async fn test_exactly_at_threshold_is_repaired() {
    let fx = fixture(RepairerConfig::default());
    // 阈值 60 分钟，started_at 恰好 60 分钟前
    fx.repo.insert(stuck_running("t1", 60));
    write_jsonl(&fx, "p1", "t1", 42);

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.repaired, 1);
    let task = fx.repo.get_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.item_count, 42);
}

#[tokio::test]
async fn test_live_process_is_left_alone() {
    let fx = fixture(RepairerConfig::default());
    fx.repo.insert(stuck_running("t1", 90));
    fx.probe.mark_alive("t1");

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.examined, 1);
    assert_eq!(report.repaired, 0);
    assert_eq!(
        fx.repo.get_by_id("t1").await.unwrap().unwrap().status,
        TaskStatus::Running
    );
}

#[tokio::test]
async fn test_probe_failure_skips_instead_of_killing() {
    let fx = fixture(RepairerConfig::default());
    fx.repo.insert(stuck_running("t1", 90));
    fx.probe.set_errors(true);

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.repaired, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(
        fx.repo.get_by_id("t1").await.unwrap().unwrap().status,
        TaskStatus::Running
    );
}

#[tokio::test]
async fn test_recent_running_task_is_untouched() {
    let fx = fixture(RepairerConfig::default());
    fx.repo.insert(stuck_running("t1", 10));

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.examined, 0);
}

#[tokio::test]
async fn test_stale_pending_is_failed_regardless_of_results() {
    let fx = fixture(RepairerConfig::default());
    fx.repo.insert(
        TaskBuilder::new("t1")
            .with_status(TaskStatus::Pending)
            .with_created_at(Utc::now() - Duration::minutes(45))
            .build(),
    );
    // 排队超时的任务即使有结果文件也判失败
    write_jsonl(&fx, "p1", "t1", 42);

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.repaired, 1);

    let task = fx.repo.get_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.item_count, 0);
    assert!(task.finished_at.is_some());
}

#[tokio::test]
async fn test_batch_limit_bounds_each_category() {
    let config = RepairerConfig {
        batch_limit: 2,
        ..RepairerConfig::default()
    };
    let fx = fixture(config);
    for i in 0..5 {
        fx.repo.insert(stuck_running(&format!("t{i}"), 90));
    }

    let report = fx.repairer.repair_cycle().await;
    assert_eq!(report.examined, 2);
    assert_eq!(report.repaired, 2);
    assert_eq!(fx.repairer.total_repaired(), 2);
}
