use anyhow::Context;
use clap::ValueEnum;
use followcore::estimation::{CameraModel, DistanceBearingModel, ObstacleReading};
use followcore::interface::{BoundingBox, Detection};
use followcore::math::{ned_to_body, wrap_angle};
use nalgebra::Vector2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::generator::vehicle::SimVehicle;

/// Preset variations applied on top of the configured scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioKind {
    /// Person walks away and meanders; nothing in the way.
    Walk,
    /// The detector goes blind for two seconds mid-run.
    Dropout,
    /// A pillar stands between the vehicle and the person.
    Obstacle,
}

/// Interval during which the detector reports nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DropoutWindow {
    pub start: f64,
    pub end: f64,
}

/// Round obstacle fixed in the local NED frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObstaclePlacement {
    pub north: f32,
    pub east: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub seed: u64,
    /// Initial distance of the person straight ahead of the vehicle.
    pub person_start_range: f32,
    pub person_speed: f32,
    /// Heading drift of the walking person in rad/s.
    pub person_turn_rate: f32,
    /// Amplitude of the uniform bounding-box jitter in pixels.
    pub detection_noise_px: f32,
    pub detection_confidence: f32,
    /// Obstacle scanner reach; empty sectors report this distance.
    pub sensor_range: f32,
    #[serde(default)]
    pub dropout: Option<DropoutWindow>,
    #[serde(default)]
    pub obstacles: Vec<ObstaclePlacement>,
}

impl ScenarioConfig {
    pub fn with_kind(mut self, kind: ScenarioKind) -> Self {
        match kind {
            ScenarioKind::Walk => {}
            ScenarioKind::Dropout => {
                self.dropout.get_or_insert(DropoutWindow {
                    start: 5.0,
                    end: 7.0,
                });
            }
            ScenarioKind::Obstacle => {
                self.person_turn_rate = 0.0;
                if self.obstacles.is_empty() {
                    self.obstacles.push(ObstaclePlacement {
                        north: 3.0,
                        east: 0.0,
                        radius: 0.3,
                    });
                }
            }
        }
        self
    }
}

/// Walking person plus the synthetic camera and obstacle scanner that
/// observe it from the simulated vehicle.
pub struct Scenario {
    config: ScenarioConfig,
    model: DistanceBearingModel,
    rng: StdRng,
    person: Vector2<f32>,
    heading: f32,
}

impl Scenario {
    pub fn new(config: ScenarioConfig, camera: CameraModel) -> anyhow::Result<Self> {
        let model = DistanceBearingModel::new(camera).context("building camera model")?;
        let rng = StdRng::seed_from_u64(config.seed);
        let person = Vector2::new(config.person_start_range, 0.0);
        Ok(Self {
            config,
            model,
            rng,
            person,
            heading: 0.0,
        })
    }

    /// Person position in local NED (north, east).
    #[cfg(test)]
    pub fn person(&self) -> Vector2<f32> {
        self.person
    }

    pub fn step(&mut self, dt: f32) {
        self.heading = wrap_angle(self.heading + self.config.person_turn_rate * dt);
        let direction = Vector2::new(self.heading.cos(), self.heading.sin());
        self.person += direction * self.config.person_speed * dt;
    }

    /// Camera frame at `now`. `None` when the person is outside the field of
    /// view or the detector is in a dropout.
    pub fn detect(&mut self, vehicle: &SimVehicle, now: f64) -> Option<Detection> {
        if let Some(window) = self.config.dropout {
            if (window.start..window.end).contains(&now) {
                return None;
            }
        }

        let (range, bearing) = body_range_bearing(vehicle, self.person);
        let half_fov = self.model.camera().horizontal_fov / 2.0;
        if range <= f32::EPSILON || bearing.abs() >= half_fov {
            return None;
        }

        let clean = self.model.project(range, bearing);
        let bbox = BoundingBox::new(
            clean.x + self.jitter(),
            clean.y + self.jitter(),
            (clean.width + self.jitter()).max(1.0),
            (clean.height + self.jitter()).max(1.0),
        );
        let spread = self.rng.gen_range(-0.05..0.05);
        let confidence = (self.config.detection_confidence + spread).clamp(0.0, 1.0);
        Some(Detection::new(bbox, confidence, now))
    }

    /// One reading per sector: the closest obstacle surface, or the sensor
    /// range when the sector is empty.
    pub fn scan(&self, vehicle: &SimVehicle, sector_count: usize, now: f64) -> Vec<ObstacleReading> {
        let width = TAU / sector_count as f32;
        let mut closest = vec![self.config.sensor_range; sector_count];

        for obstacle in &self.config.obstacles {
            let centre = Vector2::new(obstacle.north, obstacle.east);
            let (distance, bearing) = body_range_bearing(vehicle, centre);
            let surface = (distance - obstacle.radius).max(0.0);
            if surface > self.config.sensor_range {
                continue;
            }
            let steps = (wrap_angle(bearing) / width).round() as i64;
            let sector = steps.rem_euclid(sector_count as i64) as usize;
            closest[sector] = closest[sector].min(surface);
        }

        closest
            .into_iter()
            .enumerate()
            .map(|(sector, distance)| ObstacleReading {
                bearing_sector: sector,
                min_clearance_distance: distance,
                timestamp: now,
            })
            .collect()
    }

    fn jitter(&mut self) -> f32 {
        let noise = self.config.detection_noise_px;
        if noise > 0.0 {
            self.rng.gen_range(-noise..noise)
        } else {
            0.0
        }
    }
}

/// Horizontal range and body-frame bearing from the vehicle to a NED point.
fn body_range_bearing(vehicle: &SimVehicle, point: Vector2<f32>) -> (f32, f32) {
    let offset = point - vehicle.horizontal_position();
    let (forward, right) = ned_to_body(offset.x, offset.y, vehicle.yaw());
    (forward.hypot(right), right.atan2(forward))
}
