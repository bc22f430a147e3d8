pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::{EngineError, EngineResult};
pub use models::{
    Alert, AlertLevel, DependencyStatus, EventKind, HealthSnapshot, LifecycleEvent, LocateOutcome,
    PushKind, PushMessage, ResultArtifact, ResultFormat, Task, TaskStatus, ALL_CHANNELS,
};
pub use traits::{
    DependencyProber, EventBus, ProcessProbe, ResultRowCounter, ScheduleRepository, Subscriber,
    TaskRepository,
};
