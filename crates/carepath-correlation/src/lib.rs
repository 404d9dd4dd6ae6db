pub mod registry;
pub mod sweeper;

pub use registry::{CorrelationEntry, CorrelationRegistry};
pub use sweeper::{spawn_sweeper, CorrelationObserver};
