use followcore::estimation::ObstacleReading;
use followcore::interface::{Detection, ProtocolMessage, Telemetry};
use followcore::prelude::CommandSink;
use followcore::{FollowError, FollowResult};
use std::sync::{Arc, Mutex};

use crate::generator::scenario::Scenario;
use crate::generator::vehicle::SimVehicle;

/// Sensor snapshot taken from the simulated world at one instant.
pub struct Observation {
    pub telemetry: Telemetry,
    pub detection: Option<Detection>,
    pub obstacles: Vec<ObstacleReading>,
}

/// Scenario and vehicle advanced together.
pub struct SimWorld {
    scenario: Scenario,
    vehicle: SimVehicle,
    sector_count: usize,
}

impl SimWorld {
    pub fn new(scenario: Scenario, vehicle: SimVehicle, sector_count: usize) -> Self {
        Self {
            scenario,
            vehicle,
            sector_count,
        }
    }

    pub fn observe(&mut self, now: f64) -> Observation {
        Observation {
            telemetry: self.vehicle.telemetry(now),
            detection: self.scenario.detect(&self.vehicle, now),
            obstacles: self.scenario.scan(&self.vehicle, self.sector_count, now),
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.scenario.step(dt);
        self.vehicle.step(dt);
    }
}

impl CommandSink for SimWorld {
    fn send(&mut self, message: &ProtocolMessage) -> FollowResult<()> {
        self.vehicle.send(message)
    }
}

/// World shared between the real-time producer task and the control loop.
#[derive(Clone)]
pub struct SharedWorld(pub Arc<Mutex<SimWorld>>);

impl CommandSink for SharedWorld {
    fn send(&mut self, message: &ProtocolMessage) -> FollowResult<()> {
        let mut world = self
            .0
            .lock()
            .map_err(|_| FollowError::ProtocolRejection("simulated link unavailable".into()))?;
        world.send(message)
    }
}
