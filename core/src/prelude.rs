use serde::{Deserialize, Serialize};

use crate::estimation::TargetState;
use crate::interface::{ControlCommand, ProtocolMessage, Telemetry};

/// Faults that force the controller into FAILSAFE.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CriticalFault {
    #[error("battery critical ({level:.2})")]
    CriticalBattery { level: f32 },
    #[error("gps fix lost")]
    GpsFixLost,
    #[error("external abort")]
    Abort,
    #[error("telemetry missing for {missed_ticks} ticks")]
    TelemetryTimeout { missed_ticks: u32 },
    #[error("{count} consecutive missed or rejected ticks")]
    ConsecutiveFaults { count: u32 },
    #[error("target not reacquired within holding timeout")]
    HoldingTimeout,
}

/// Common error type for the follow core.
///
/// Target loss is not represented here: it is ordinary state carried by
/// [`TargetState`] and handled by the HOLDING mode.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FollowError {
    #[error("sensor fault: {0}")]
    SensorFault(String),
    #[error("geometry unavailable: {0}")]
    GeometryUnavailable(String),
    #[error("protocol rejection: {0}")]
    ProtocolRejection(String),
    #[error("critical fault: {0}")]
    CriticalFault(CriticalFault),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type FollowResult<T> = Result<T, FollowError>;

/// Produces a velocity/yaw setpoint from the filtered target and the current
/// flight state. Implementations must be pure with respect to their inputs.
pub trait ControlLaw {
    fn compute(&self, target: &TargetState, telemetry: &Telemetry, now: f64) -> ControlCommand;
}

/// Link to the flight-control firmware.
pub trait CommandSink {
    fn send(&mut self, message: &ProtocolMessage) -> FollowResult<()>;
}

impl CommandSink for Vec<ProtocolMessage> {
    fn send(&mut self, message: &ProtocolMessage) -> FollowResult<()> {
        self.push(message.clone());
        Ok(())
    }
}
