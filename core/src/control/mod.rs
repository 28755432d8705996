pub mod controller;
pub mod law;

pub use controller::{ControlInputs, FollowController};
pub use law::TrackingLaw;

#[cfg(test)]
pub(crate) mod fixtures {
    use nalgebra::Vector3;

    use crate::estimation::{TargetState, TargetStatus};
    use crate::interface::{Attitude, GpsFix, Position, Telemetry};

    /// Level hover 3 m above home, facing north.
    pub fn telemetry() -> Telemetry {
        Telemetry {
            timestamp: 0.0,
            position: Position::Local(Vector3::new(0.0, 0.0, -3.0)),
            velocity: Vector3::zeros(),
            attitude: Attitude::default(),
            battery_level: 0.9,
            gps_fix: GpsFix::Fix3D,
        }
    }

    pub fn tracked(range: f32, bearing: f32) -> TargetState {
        TargetState {
            estimated_range: range,
            estimated_bearing: bearing,
            lateral_velocity: 0.0,
            range_velocity: 0.0,
            last_seen_timestamp: Some(0.0),
            confidence_decay: 0.0,
            status: TargetStatus::Tracked,
        }
    }
}
