use nalgebra::Vector3;

use crate::config::FollowConfig;
use crate::estimation::TargetState;
use crate::interface::{ControlCommand, FlightMode, Telemetry};
use crate::math::{clamp_norm, clamp_symmetric, wrap_angle};
use crate::prelude::ControlLaw;

/// Proportional-derivative follow law.
///
/// Forward speed drives range toward `target_distance`, yaw rate drives
/// bearing toward `target_bearing_offset`; the target's range and lateral
/// velocities act as derivative feedforward. Range errors inside
/// `distance_tolerance` are not corrected.
#[derive(Debug, Clone)]
pub struct TrackingLaw {
    config: FollowConfig,
}

impl TrackingLaw {
    pub fn new(config: FollowConfig) -> Self {
        Self { config }
    }
}

impl ControlLaw for TrackingLaw {
    fn compute(&self, target: &TargetState, telemetry: &Telemetry, now: f64) -> ControlCommand {
        let config = &self.config;
        let gains = &config.gains;

        let mut range_error = target.estimated_range - config.target_distance;
        if range_error.abs() <= config.distance_tolerance {
            range_error = 0.0;
        }
        let forward = gains.range_p * range_error + gains.range_d * target.range_velocity;
        let lateral = gains.lateral_ff * target.lateral_velocity;
        let vertical = match config.target_altitude {
            // Body z is down: climbing is a negative command.
            Some(altitude) => -gains.altitude_p * (altitude - telemetry.position.altitude()),
            None => 0.0,
        };

        let bearing_error = wrap_angle(target.estimated_bearing - config.target_bearing_offset);
        let yaw_rate = gains.bearing_p * bearing_error + gains.bearing_d * target.bearing_rate();

        ControlCommand {
            desired_velocity: clamp_norm(Vector3::new(forward, lateral, vertical), config.max_speed),
            desired_yaw_rate: clamp_symmetric(yaw_rate, config.max_yaw_rate),
            mode: FlightMode::Tracking,
            issued_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::follow_config;
    use crate::control::fixtures::{telemetry, tracked};

    #[test]
    fn range_error_produces_proportional_forward_speed() {
        let law = TrackingLaw::new(follow_config());
        let command = law.compute(&tracked(5.0, 0.0), &telemetry(), 0.0);
        assert!((command.desired_velocity.x - 0.8 * 2.0).abs() < 1e-5);
        assert!(command.desired_velocity.y.abs() < 1e-6);
        assert_eq!(command.desired_yaw_rate, 0.0);
    }

    #[test]
    fn range_inside_tolerance_is_not_corrected() {
        let mut config = follow_config();
        config.distance_tolerance = 0.5;
        let law = TrackingLaw::new(config);

        let settled = law.compute(&tracked(3.4, 0.0), &telemetry(), 0.0);
        assert_eq!(settled.desired_velocity.x, 0.0);
        let settled = law.compute(&tracked(2.6, 0.0), &telemetry(), 0.0);
        assert_eq!(settled.desired_velocity.x, 0.0);

        let mut receding = tracked(3.4, 0.0);
        receding.range_velocity = 1.0;
        let matched = law.compute(&receding, &telemetry(), 0.0);
        assert!((matched.desired_velocity.x - 0.2).abs() < 1e-5);

        let outside = law.compute(&tracked(4.0, 0.0), &telemetry(), 0.0);
        assert!((outside.desired_velocity.x - 0.8).abs() < 1e-5);
    }

    #[test]
    fn too_close_target_backs_away() {
        let law = TrackingLaw::new(follow_config());
        let command = law.compute(&tracked(1.0, 0.0), &telemetry(), 0.0);
        assert!(command.desired_velocity.x < 0.0);
    }

    #[test]
    fn bearing_offset_is_the_yaw_setpoint() {
        let mut config = follow_config();
        config.target_bearing_offset = 0.2;
        let law = TrackingLaw::new(config);
        let on_offset = law.compute(&tracked(3.0, 0.2), &telemetry(), 0.0);
        assert!(on_offset.desired_yaw_rate.abs() < 1e-6);
        let right_of_offset = law.compute(&tracked(3.0, 0.4), &telemetry(), 0.0);
        assert!(right_of_offset.desired_yaw_rate > 0.0);
    }

    #[test]
    fn outputs_respect_speed_and_yaw_caps() {
        let law = TrackingLaw::new(follow_config());
        let mut target = tracked(50.0, 2.5);
        target.lateral_velocity = 20.0;
        let command = law.compute(&target, &telemetry(), 0.0);
        assert!(command.desired_velocity.norm() <= 4.0 + 1e-5);
        assert!(command.desired_yaw_rate.abs() <= 1.0 + 1e-6);
    }

    #[test]
    fn range_velocity_feeds_forward() {
        let law = TrackingLaw::new(follow_config());
        let mut receding = tracked(4.0, 0.0);
        receding.range_velocity = 1.0;
        let still = law.compute(&tracked(4.0, 0.0), &telemetry(), 0.0);
        let moving = law.compute(&receding, &telemetry(), 0.0);
        assert!(moving.desired_velocity.x > still.desired_velocity.x);
    }

    #[test]
    fn altitude_hold_climbs_when_low() {
        let mut config = follow_config();
        config.target_altitude = Some(5.0);
        config.gains.altitude_p = 0.5;
        let law = TrackingLaw::new(config);
        // Fixture telemetry hovers at 3 m.
        let command = law.compute(&tracked(3.0, 0.0), &telemetry(), 0.0);
        assert!((command.desired_velocity.z + 1.0).abs() < 1e-5);
    }
}
