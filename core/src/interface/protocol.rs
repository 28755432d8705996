use serde::{Deserialize, Serialize};

/// Ignore position (bits 0-2), acceleration (bits 6-8) and yaw (bit 10);
/// velocity and yaw rate are used.
pub const VELOCITY_YAW_RATE_TYPE_MASK: u16 = 0b0000_0101_1100_0111;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateFrame {
    /// Forward-right-down relative to the vehicle heading.
    BodyNed,
}

/// Firmware flight modes requested on FAILSAFE entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareMode {
    Loiter,
    Land,
    ReturnToLaunch,
}

/// Guided-mode velocity and yaw-rate setpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VelocitySetpoint {
    pub time_boot_ms: u32,
    pub frame: CoordinateFrame,
    pub type_mask: u16,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub yaw_rate: f32,
}

/// Message handed to the flight-control firmware link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolMessage {
    Velocity(VelocitySetpoint),
    SetMode { mode: FirmwareMode, time_boot_ms: u32 },
}

impl ProtocolMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
