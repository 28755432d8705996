pub mod geometry;
pub mod obstacle;
pub mod target;

pub use geometry::{CameraModel, DistanceBearingModel, RangeBearing};
pub use obstacle::{Clearance, ObstacleMap, ObstacleMapConfig, ObstacleReading};
pub use target::{EstimatorConfig, TargetEstimator, TargetState, TargetStatus};
