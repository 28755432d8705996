use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Vehicle position as reported by the flight stack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Global {
        lat_deg: f64,
        lon_deg: f64,
        alt_m: f32,
    },
    /// North/east/down offset from home in metres.
    Local(Vector3<f32>),
}

impl Position {
    /// Altitude above home, positive up.
    pub fn altitude(&self) -> f32 {
        match self {
            Position::Global { alt_m, .. } => *alt_m,
            Position::Local(ned) => -ned.z,
        }
    }
}

/// Euler attitude in radians.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// GNSS fix quality, ordered from worst to best.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GpsFix {
    NoFix,
    #[serde(rename = "fix_2d")]
    Fix2D,
    #[serde(rename = "fix_3d")]
    Fix3D,
    Dgps,
    RtkFloat,
    RtkFixed,
}

/// Flight-state snapshot supplied by the flight stack once per tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Telemetry {
    pub timestamp: f64,
    pub position: Position,
    /// NED velocity in m/s.
    pub velocity: Vector3<f32>,
    pub attitude: Attitude,
    /// Remaining charge as a fraction in [0, 1].
    pub battery_level: f32,
    pub gps_fix: GpsFix,
}

impl Telemetry {
    /// Horizontal velocity rotated into the body frame (x forward, y right).
    pub fn body_horizontal_velocity(&self) -> (f32, f32) {
        crate::math::frames::ned_to_body(self.velocity.x, self.velocity.y, self.attitude.yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_fix_orders_by_quality() {
        assert!(GpsFix::NoFix < GpsFix::Fix2D);
        assert!(GpsFix::Fix3D < GpsFix::RtkFixed);
    }

    #[test]
    fn gps_fix_names_read_naturally() {
        assert_eq!(serde_json::to_string(&GpsFix::Fix3D).unwrap(), "\"fix_3d\"");
        assert_eq!(serde_json::to_string(&GpsFix::RtkFixed).unwrap(), "\"rtk_fixed\"");
    }

    #[test]
    fn local_position_altitude_is_negated_down() {
        let position = Position::Local(Vector3::new(1.0, 2.0, -5.0));
        assert_eq!(position.altitude(), 5.0);
    }
}
