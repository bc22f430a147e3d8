//! 任务生命周期与统计对账引擎
//!
//! 四个后台服务围绕同一个任务仓库协作：事件消费把 worker 的生命周期上报
//! 落库，对账器在三个事实来源间取最大值修正计数，巡检与修复兜住漏报和
//! 卡死，健康采样盯住整体口径。

pub mod health;
pub mod ingestor;
pub mod reconciler;
pub mod repairer;
pub mod sweeper;

pub use health::HealthSampler;
pub use ingestor::{classify_finish, EventIngestor, FinishVerdict};
pub use reconciler::{ReconcileOutcome, ReconcileSources, StatisticsReconciler};
pub use repairer::{RepairReport, StuckTaskRepairer};
pub use sweeper::{BatchSweeper, ProjectSweep, SweepReport};
