use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Overall state of the follow system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlightMode {
    Searching,
    Acquiring,
    Tracking,
    Holding,
    Avoiding,
    Failsafe,
}

impl FlightMode {
    pub fn name(&self) -> &'static str {
        match self {
            FlightMode::Searching => "SEARCHING",
            FlightMode::Acquiring => "ACQUIRING",
            FlightMode::Tracking => "TRACKING",
            FlightMode::Holding => "HOLDING",
            FlightMode::Avoiding => "AVOIDING",
            FlightMode::Failsafe => "FAILSAFE",
        }
    }
}

/// Setpoint produced once per tick and consumed immediately by the dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ControlCommand {
    /// Body-frame velocity (x forward, y right, z down) in m/s.
    pub desired_velocity: Vector3<f32>,
    /// Yaw rate in rad/s, positive clockwise.
    pub desired_yaw_rate: f32,
    pub mode: FlightMode,
    /// Tick time at which the command was computed.
    pub issued_at: f64,
}

impl ControlCommand {
    /// Zero-velocity command for the given mode.
    pub fn hold(mode: FlightMode, issued_at: f64) -> Self {
        Self {
            desired_velocity: Vector3::zeros(),
            desired_yaw_rate: 0.0,
            mode,
            issued_at,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.desired_velocity.iter().all(|v| v.is_finite()) && self.desired_yaw_rate.is_finite()
    }
}
