//! 共享测试替身：内存仓库、构造器与探测桩，供各 crate 的 tests/ 使用。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crawldeck_core::{
    DependencyStatus, EngineError, EngineResult, Subscriber, Task, TaskStatus,
};
use crawldeck_core::traits::{
    DependencyProber, EventBus, ProcessProbe, ResultRowCounter, ScheduleRepository, TaskRepository,
};

/// 测试用任务构造器
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: Task {
                id: id.to_string(),
                project_id: "p1".to_string(),
                spider_id: "s1".to_string(),
                status: TaskStatus::Pending,
                item_count: 0,
                request_count: 0,
                error_count: 0,
                started_at: None,
                finished_at: None,
                error_message: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_project(mut self, project_id: &str) -> Self {
        self.task.project_id = project_id.to_string();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_item_count(mut self, count: i64) -> Self {
        self.task.item_count = count;
        self
    }

    pub fn with_request_count(mut self, count: i64) -> Self {
        self.task.request_count = count;
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.started_at = Some(at);
        self
    }

    pub fn with_finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.finished_at = Some(at);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.created_at = at;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// 内存任务仓库
#[derive(Default)]
pub struct MockTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
    ping_fails: AtomicBool,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id.clone(), task);
    }

    pub fn set_ping_fails(&self, fails: bool) {
        self.ping_fails.store(fails, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn get_by_id(&self, id: &str) -> EngineResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> EngineResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::TaskNotFound { id: id.to_string() })?;
        task.status = status;
        match status {
            TaskStatus::Running => {
                if task.started_at.is_none() {
                    task.started_at = Some(Utc::now());
                }
            }
            s if s.is_terminal() => {
                if task.finished_at.is_none() {
                    task.finished_at = Some(Utc::now());
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn set_item_count(&self, id: &str, count: i64) -> EngineResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::TaskNotFound { id: id.to_string() })?;
        let new_items = task.item_count.max(count);
        let new_requests = task.request_count.max(new_items);
        let changed = new_items != task.item_count || new_requests != task.request_count;
        task.item_count = new_items;
        task.request_count = new_requests;
        Ok(changed)
    }

    async fn set_error(&self, id: &str, message: &str) -> EngineResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::TaskNotFound { id: id.to_string() })?;
        task.error_message = Some(message.to_string());
        task.error_count += 1;
        Ok(())
    }

    async fn find_finished_since(
        &self,
        since: DateTime<Utc>,
        project_id: Option<&str>,
    ) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .values()
            .filter(|t| t.status == TaskStatus::Finished && t.created_at >= since)
            .filter(|t| project_id.is_none_or(|p| t.project_id == p))
            .cloned()
            .collect())
    }

    async fn find_stuck(
        &self,
        status: TaskStatus,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == status)
            .filter(|t| {
                let anchor = match status {
                    TaskStatus::Running => t.started_at.unwrap_or(t.created_at),
                    _ => t.created_at,
                };
                anchor <= older_than
            })
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn find_zero_item_finished(&self, limit: i64) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Finished && t.item_count == 0)
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn count_by_status(&self, status: TaskStatus) -> EngineResult<i64> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.values().filter(|t| t.status == status).count() as i64)
    }

    async fn count_failed_since(&self, since: DateTime<Utc>) -> EngineResult<i64> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Failed && t.finished_at.is_some_and(|at| at >= since)
            })
            .count() as i64)
    }

    async fn ping(&self) -> EngineResult<()> {
        if self.ping_fails.load(Ordering::SeqCst) {
            Err(EngineError::DatabaseOperation("ping failed".to_string()))
        } else {
            Ok(())
        }
    }
}

/// 结果表行计数桩
#[derive(Default)]
pub struct MockRowCounter {
    counts: Mutex<HashMap<String, i64>>,
}

impl MockRowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_count(&self, task_id: &str, count: i64) {
        self.counts.lock().unwrap().insert(task_id.to_string(), count);
    }
}

#[async_trait]
impl ResultRowCounter for MockRowCounter {
    async fn count_rows(&self, task_id: &str) -> EngineResult<i64> {
        Ok(*self.counts.lock().unwrap().get(task_id).unwrap_or(&0))
    }
}

/// 调度仓库桩
pub struct MockScheduleRepository {
    active: Mutex<i64>,
}

impl MockScheduleRepository {
    pub fn new(active: i64) -> Self {
        Self {
            active: Mutex::new(active),
        }
    }

    pub fn set_active(&self, count: i64) {
        *self.active.lock().unwrap() = count;
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn count_active(&self) -> EngineResult<i64> {
        Ok(*self.active.lock().unwrap())
    }
}

/// 内存事件总线：publish 入队，consume 清空返回
#[derive(Default)]
pub struct MockEventBus {
    channels: Mutex<HashMap<String, VecDeque<Value>>>,
    ping_fails: AtomicBool,
    consume_fails: AtomicBool,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, channel: &str, payload: Value) {
        self.channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push_back(payload);
    }

    pub fn set_ping_fails(&self, fails: bool) {
        self.ping_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_consume_fails(&self, fails: bool) {
        self.consume_fails.store(fails, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn consume(&self, channel: &str) -> EngineResult<Vec<Value>> {
        if self.consume_fails.load(Ordering::SeqCst) {
            return Err(EngineError::EventBus("consume failed".to_string()));
        }
        let mut channels = self.channels.lock().unwrap();
        Ok(channels
            .get_mut(channel)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> EngineResult<()> {
        if self.ping_fails.load(Ordering::SeqCst) {
            Err(EngineError::EventBus("ping failed".to_string()))
        } else {
            Ok(())
        }
    }
}

/// 进程存活探测桩
#[derive(Default)]
pub struct MockProcessProbe {
    alive: Mutex<HashSet<String>>,
    errors: AtomicBool,
}

impl MockProcessProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_alive(&self, task_id: &str) {
        self.alive.lock().unwrap().insert(task_id.to_string());
    }

    pub fn set_errors(&self, errors: bool) {
        self.errors.store(errors, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessProbe for MockProcessProbe {
    async fn is_task_process_alive(&self, task_id: &str) -> EngineResult<bool> {
        if self.errors.load(Ordering::SeqCst) {
            return Err(EngineError::ProbeTimeout("probe timed out".to_string()));
        }
        Ok(self.alive.lock().unwrap().contains(task_id))
    }
}

/// 依赖探测桩：按名称返回预置结论
#[derive(Default)]
pub struct MockDependencyProber {
    unhealthy: Mutex<HashSet<String>>,
}

impl MockDependencyProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unhealthy(&self, name: &str) {
        self.unhealthy.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl DependencyProber for MockDependencyProber {
    async fn probe(&self, name: &str, _url: &str) -> DependencyStatus {
        let healthy = !self.unhealthy.lock().unwrap().contains(name);
        DependencyStatus {
            name: name.to_string(),
            healthy,
            detail: if healthy {
                None
            } else {
                Some("unreachable".to_string())
            },
        }
    }
}

/// 记录投递内容的订阅者
#[derive(Default)]
pub struct RecordingSubscriber {
    sent: Mutex<Vec<String>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    async fn send_text(&self, payload: String) -> EngineResult<()> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

/// 总是投递失败的订阅者（模拟已关闭的连接）
#[derive(Default)]
pub struct FailingSubscriber {
    pub attempts: AtomicUsize,
}

impl FailingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subscriber for FailingSubscriber {
    async fn send_text(&self, _payload: String) -> EngineResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::Delivery("connection closed".to_string()))
    }
}
