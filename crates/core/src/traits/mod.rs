pub mod event_bus;
pub mod probes;
pub mod repository;
pub mod subscriber;

pub use event_bus::EventBus;
pub use probes::{DependencyProber, ProcessProbe};
pub use repository::{ResultRowCounter, ScheduleRepository, TaskRepository};
pub use subscriber::Subscriber;
