use followcore::interface::{
    Attitude, FirmwareMode, GpsFix, Position, ProtocolMessage, Telemetry,
};
use followcore::math::{body_to_ned, wrap_angle};
use followcore::prelude::CommandSink;
use followcore::FollowResult;
use log::trace;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

const LANDING_SPEED: f32 = 0.5;
const RETURN_SPEED: f32 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub start_altitude: f32,
    pub start_battery: f32,
    pub battery_drain_per_s: f32,
    pub gps_fix: GpsFix,
}

/// Flight-stack mode of the simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleMode {
    Guided,
    Firmware(FirmwareMode),
}

/// Point-mass multirotor that executes setpoints instantly.
#[derive(Debug, Clone)]
pub struct SimVehicle {
    config: VehicleConfig,
    position: Vector3<f32>,
    velocity: Vector3<f32>,
    yaw: f32,
    yaw_rate: f32,
    battery: f32,
    mode: VehicleMode,
}

impl SimVehicle {
    pub fn new(config: VehicleConfig) -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, -config.start_altitude),
            velocity: Vector3::zeros(),
            yaw: 0.0,
            yaw_rate: 0.0,
            battery: config.start_battery,
            mode: VehicleMode::Guided,
            config,
        }
    }

    pub fn horizontal_position(&self) -> Vector2<f32> {
        self.position.xy()
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[cfg(test)]
    pub fn altitude(&self) -> f32 {
        -self.position.z
    }

    pub fn step(&mut self, dt: f32) {
        match self.mode {
            VehicleMode::Guided => {}
            VehicleMode::Firmware(FirmwareMode::Loiter) => {
                self.velocity = Vector3::zeros();
                self.yaw_rate = 0.0;
            }
            VehicleMode::Firmware(FirmwareMode::Land) => self.descend(),
            VehicleMode::Firmware(FirmwareMode::ReturnToLaunch) => {
                self.yaw_rate = 0.0;
                let home = -self.position.xy();
                if home.norm() > RETURN_SPEED * dt {
                    let towards = home.normalize() * RETURN_SPEED;
                    self.velocity = Vector3::new(towards.x, towards.y, 0.0);
                } else {
                    self.descend();
                }
            }
        }

        self.position += self.velocity * dt;
        if self.position.z > 0.0 {
            self.position.z = 0.0;
            self.velocity = Vector3::zeros();
        }
        self.yaw = wrap_angle(self.yaw + self.yaw_rate * dt);
        self.battery = (self.battery - self.config.battery_drain_per_s * dt).max(0.0);
    }

    pub fn telemetry(&self, now: f64) -> Telemetry {
        Telemetry {
            timestamp: now,
            position: Position::Local(self.position),
            velocity: self.velocity,
            attitude: Attitude {
                roll: 0.0,
                pitch: 0.0,
                yaw: self.yaw,
            },
            battery_level: self.battery,
            gps_fix: self.config.gps_fix,
        }
    }

    fn descend(&mut self) {
        self.yaw_rate = 0.0;
        self.velocity = Vector3::new(0.0, 0.0, LANDING_SPEED);
    }
}

impl CommandSink for SimVehicle {
    fn send(&mut self, message: &ProtocolMessage) -> FollowResult<()> {
        if let Ok(json) = message.to_json() {
            trace!("firmware link <- {}", json);
        }
        match message {
            ProtocolMessage::Velocity(setpoint) => {
                // Guided setpoints are ignored once the firmware has taken over.
                if self.mode == VehicleMode::Guided {
                    let (north, east) = body_to_ned(setpoint.vx, setpoint.vy, self.yaw);
                    self.velocity = Vector3::new(north, east, setpoint.vz);
                    self.yaw_rate = setpoint.yaw_rate;
                }
            }
            ProtocolMessage::SetMode { mode, .. } => {
                self.mode = VehicleMode::Firmware(*mode);
            }
        }
        Ok(())
    }
}
