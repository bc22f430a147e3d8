pub mod artifact;
pub mod event;
pub mod health;
pub mod push;
pub mod task;

pub use artifact::{LocateOutcome, ResultArtifact, ResultFormat};
pub use event::{
    EventKind, LifecycleEvent, ALL_CHANNELS, CHANNEL_RESULTS_PROCESSED, CHANNEL_SPIDER_FINISHED,
    CHANNEL_SPIDER_PROGRESS, CHANNEL_SPIDER_STARTED,
};
pub use health::{Alert, AlertLevel, DependencyStatus, HealthSnapshot};
pub use push::{PushKind, PushMessage};
pub use task::{Task, TaskStatus};
