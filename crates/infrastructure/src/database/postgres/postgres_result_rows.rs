use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crawldeck_core::traits::{ResultRowCounter, ScheduleRepository};
use crawldeck_core::EngineResult;

/// 结果表行计数的 Postgres 实现
pub struct PostgresResultRows {
    pool: PgPool,
}

impl PostgresResultRows {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultRowCounter for PostgresResultRows {
    #[instrument(skip(self))]
    async fn count_rows(&self, task_id: &str) -> EngineResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM results WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}

/// 调度配置表的 Postgres 实现
pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    #[instrument(skip(self))]
    async fn count_active(&self) -> EngineResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM schedules WHERE enabled = TRUE")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}
