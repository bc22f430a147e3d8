pub mod postgres_result_rows;
pub mod postgres_task_repository;

pub use postgres_result_rows::{PostgresResultRows, PostgresScheduleRepository};
pub use postgres_task_repository::PostgresTaskRepository;
