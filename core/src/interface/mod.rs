pub mod command;
pub mod detection;
pub mod protocol;
pub mod telemetry;

pub use command::{ControlCommand, FlightMode};
pub use detection::{BoundingBox, Detection};
pub use protocol::{CoordinateFrame, FirmwareMode, ProtocolMessage, VelocitySetpoint};
pub use telemetry::{Attitude, GpsFix, Position, Telemetry};
