use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::config::UnknownClearancePolicy;
use crate::math::wrap_angle;
use crate::prelude::{FollowError, FollowResult};

/// Minimum sensed distance within one angular sector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ObstacleReading {
    pub bearing_sector: usize,
    pub min_clearance_distance: f32,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleMapConfig {
    /// Number of equal sectors around the vehicle; sector 0 is centred on
    /// the forward axis and indices increase clockwise.
    pub sector_count: usize,
    /// Readings older than this many seconds are forgotten.
    pub staleness_window: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clearance {
    Known(f32),
    Unknown,
}

impl Clearance {
    /// Whether this clearance is under `threshold`, resolving unknown
    /// sectors through `policy`.
    pub fn is_below(&self, threshold: f32, policy: UnknownClearancePolicy) -> bool {
        match self {
            Clearance::Known(distance) => *distance < threshold,
            Clearance::Unknown => policy == UnknownClearancePolicy::Block,
        }
    }

    /// Whether this clearance is strictly above `threshold`, resolving
    /// unknown sectors through `policy`.
    pub fn is_clear_of(&self, threshold: f32, policy: UnknownClearancePolicy) -> bool {
        match self {
            Clearance::Known(distance) => *distance > threshold,
            Clearance::Unknown => policy == UnknownClearancePolicy::Allow,
        }
    }
}

/// Short-horizon sector occupancy used to gate the follow commands.
#[derive(Debug, Clone)]
pub struct ObstacleMap {
    config: ObstacleMapConfig,
    sectors: Vec<Option<ObstacleReading>>,
}

impl ObstacleMapConfig {
    pub fn validate(&self) -> FollowResult<()> {
        let config = self;
        if config.sector_count == 0 {
            return Err(FollowError::InvalidConfig(
                "obstacle map needs at least one sector".into(),
            ));
        }
        if !config.staleness_window.is_finite() || config.staleness_window < 0.0 {
            return Err(FollowError::InvalidConfig(
                "staleness_window must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

impl ObstacleMap {
    pub fn new(config: ObstacleMapConfig) -> FollowResult<Self> {
        config.validate()?;
        let sectors = vec![None; config.sector_count];
        Ok(Self { config, sectors })
    }

    pub fn sector_count(&self) -> usize {
        self.config.sector_count
    }

    pub fn sector_width(&self) -> f32 {
        TAU / self.config.sector_count as f32
    }

    pub fn sector_for_bearing(&self, bearing: f32) -> usize {
        let steps = (wrap_angle(bearing) / self.sector_width()).round() as i64;
        steps.rem_euclid(self.config.sector_count as i64) as usize
    }

    /// Centre bearing of a sector.
    pub fn sector_bearing(&self, sector: usize) -> f32 {
        wrap_angle(sector as f32 * self.sector_width())
    }

    /// Stores a reading, keeping the newest per sector.
    pub fn ingest(&mut self, reading: ObstacleReading) -> FollowResult<()> {
        if reading.bearing_sector >= self.config.sector_count {
            warn!("obstacle reading for unknown sector {}", reading.bearing_sector);
            return Err(FollowError::SensorFault(format!(
                "sector {} out of range (0..{})",
                reading.bearing_sector, self.config.sector_count
            )));
        }
        if !reading.min_clearance_distance.is_finite()
            || reading.min_clearance_distance < 0.0
            || !reading.timestamp.is_finite()
        {
            warn!("malformed obstacle reading {:?}", reading);
            return Err(FollowError::SensorFault(format!(
                "malformed obstacle reading in sector {}",
                reading.bearing_sector
            )));
        }

        let slot = &mut self.sectors[reading.bearing_sector];
        let newer_held = matches!(slot, Some(existing) if existing.timestamp > reading.timestamp);
        if newer_held {
            trace!("dropping out-of-order obstacle reading {:?}", reading);
        } else {
            *slot = Some(reading);
        }
        Ok(())
    }

    /// Forgets readings that fell out of the staleness window.
    pub fn expire(&mut self, now: f64) {
        let window = self.config.staleness_window;
        for slot in self.sectors.iter_mut() {
            if matches!(slot, Some(reading) if now - reading.timestamp > window) {
                *slot = None;
            }
        }
    }

    pub fn clearance(&self, sector: usize) -> Clearance {
        match self.sectors.get(sector).copied().flatten() {
            Some(reading) => Clearance::Known(reading.min_clearance_distance),
            None => Clearance::Unknown,
        }
    }

    /// Known sectors whose clearance is under `threshold`.
    pub fn sectors_below(&self, threshold: f32) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.sectors
            .iter()
            .enumerate()
            .filter_map(|(sector, slot)| slot.map(|r| (sector, r.min_clearance_distance)))
            .filter(move |(_, distance)| *distance < threshold)
    }

    pub fn clear(&mut self) {
        self.sectors.iter_mut().for_each(|slot| *slot = None);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn map() -> ObstacleMap {
        ObstacleMap::new(ObstacleMapConfig {
            sector_count: 8,
            staleness_window: 0.5,
        })
        .unwrap()
    }

    pub fn reading(sector: usize, distance: f32, timestamp: f64) -> ObstacleReading {
        ObstacleReading {
            bearing_sector: sector,
            min_clearance_distance: distance,
            timestamp,
        }
    }
}
