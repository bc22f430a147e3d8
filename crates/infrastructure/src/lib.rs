pub mod database;
pub mod dependency_prober;
pub mod process_probe;
pub mod redis_event_bus;
pub mod result_locator;
pub mod system_metrics;

pub use database::create_pool;
pub use database::postgres::{
    PostgresResultRows, PostgresScheduleRepository, PostgresTaskRepository,
};
pub use dependency_prober::HttpDependencyProber;
pub use process_probe::SysinfoProcessProbe;
pub use redis_event_bus::RedisEventBus;
pub use result_locator::ResultLocator;
pub use system_metrics::{ResourceUsage, SystemMetrics};
