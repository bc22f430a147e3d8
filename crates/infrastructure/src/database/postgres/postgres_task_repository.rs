use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crawldeck_core::traits::TaskRepository;
use crawldeck_core::{EngineError, EngineResult, Task, TaskStatus};

/// 任务仓库的 Postgres 实现
///
/// 每个写操作都是单行单语句的原子更新；item_count / request_count 的单调性
/// 由 GREATEST 在行上保证，不依赖调用方先读后写。
pub struct PostgresTaskRepository {
    pool: PgPool,
}

const TASK_COLUMNS: &str = "id, project_id, spider_id, status, item_count, request_count, \
     error_count, started_at, finished_at, error_message, created_at";

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> EngineResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            spider_id: row.try_get("spider_id")?,
            status: row.try_get("status")?,
            item_count: row.try_get("item_count")?,
            request_count: row.try_get("request_count")?,
            error_count: row.try_get("error_count")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn exists(&self, id: &str) -> EngineResult<bool> {
        let row = sqlx::query("SELECT 1 FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: &str) -> EngineResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => {
                debug!("查询任务不存在: {}", id);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(status = %status))]
    async fn update_status(&self, id: &str, status: TaskStatus) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                started_at = CASE WHEN $2 = 'RUNNING'
                    THEN COALESCE(started_at, NOW()) ELSE started_at END,
                finished_at = CASE WHEN $2 IN ('FINISHED', 'FAILED', 'CANCELLED')
                    THEN COALESCE(finished_at, NOW()) ELSE finished_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::TaskNotFound { id: id.to_string() });
        }

        debug!("任务 {} 状态更新为 {}", id, status);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_item_count(&self, id: &str, count: i64) -> EngineResult<bool> {
        // 仅在取大后产生变化时才落一次写
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET item_count = GREATEST(item_count, $2),
                request_count = GREATEST(request_count, GREATEST(item_count, $2))
            WHERE id = $1
              AND (GREATEST(item_count, $2) <> item_count
                   OR GREATEST(request_count, GREATEST(item_count, $2)) <> request_count)
            "#,
        )
        .bind(id)
        .bind(count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!("任务 {} 条目数抬升到 {}", id, count);
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(EngineError::TaskNotFound { id: id.to_string() });
        }
        Ok(false)
    }

    #[instrument(skip(self, message))]
    async fn set_error(&self, id: &str, message: &str) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET error_message = $2, error_count = error_count + 1 WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_finished_since(
        &self,
        since: DateTime<Utc>,
        project_id: Option<&str>,
    ) -> EngineResult<Vec<Task>> {
        let rows = match project_id {
            Some(project) => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE status = 'FINISHED' AND created_at >= $1 AND project_id = $2 \
                     ORDER BY created_at DESC"
                ))
                .bind(since)
                .bind(project)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE status = 'FINISHED' AND created_at >= $1 \
                     ORDER BY created_at DESC"
                ))
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self), fields(status = %status))]
    async fn find_stuck(
        &self,
        status: TaskStatus,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> EngineResult<Vec<Task>> {
        // Running 以实际开始时间为锚点，Pending 等以创建时间
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status = $1 \
               AND (CASE WHEN $1 = 'RUNNING' \
                    THEN COALESCE(started_at, created_at) ELSE created_at END) <= $2 \
             ORDER BY created_at ASC \
             LIMIT $3"
        ))
        .bind(status)
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn find_zero_item_finished(&self, limit: i64) -> EngineResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status = 'FINISHED' AND item_count = 0 \
             ORDER BY created_at DESC \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self), fields(status = %status))]
    async fn count_by_status(&self, status: TaskStatus) -> EngineResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM tasks WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    #[instrument(skip(self))]
    async fn count_failed_since(&self, since: DateTime<Utc>) -> EngineResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM tasks \
             WHERE status = 'FAILED' AND finished_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }

    async fn ping(&self) -> EngineResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
