pub mod log;
pub mod metrics;

pub use log::{LogManager, OperatorAlert};
pub use metrics::{MetricsRecorder, MetricsSnapshot};
