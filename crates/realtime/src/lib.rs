pub mod broadcaster;

pub use broadcaster::{Broadcaster, ConnectionId, ConnectionStats};
