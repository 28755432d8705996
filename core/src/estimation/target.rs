use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::estimation::geometry::{DistanceBearingModel, RangeBearing};
use crate::interface::Detection;
use crate::math::{wrap_angle, ExpSmoother};
use crate::prelude::{FollowError, FollowResult};

/// Tuning of the target filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Time constant of the exponential smoothing, seconds.
    pub smoothing_time_constant: f64,
    /// Detections below this confidence are treated as absent.
    pub min_confidence: f32,
    /// Growth of `confidence_decay` per second without a detection.
    pub decay_rate: f32,
}

impl EstimatorConfig {
    pub fn validate(&self) -> FollowResult<()> {
        if !self.smoothing_time_constant.is_finite() || self.smoothing_time_constant < 0.0 {
            return Err(FollowError::InvalidConfig(
                "smoothing_time_constant must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(FollowError::InvalidConfig(
                "min_confidence must lie within [0, 1]".into(),
            ));
        }
        if !self.decay_rate.is_finite() || self.decay_rate <= 0.0 {
            return Err(FollowError::InvalidConfig(
                "decay_rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Updated from a detection this tick.
    Tracked,
    /// Dead-reckoned from the last fix.
    Coasting,
    /// Not seen within the loss timeout, or never seen.
    Lost,
}

/// Filtered, velocity-aware estimate of the followed person.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TargetState {
    pub estimated_range: f32,
    pub estimated_bearing: f32,
    /// Tangential velocity of the target in m/s, positive to the right.
    pub lateral_velocity: f32,
    /// Rate of change of range in m/s, positive when moving away.
    pub range_velocity: f32,
    pub last_seen_timestamp: Option<f64>,
    pub confidence_decay: f32,
    pub status: TargetStatus,
}

impl TargetState {
    pub fn unacquired() -> Self {
        Self {
            estimated_range: 0.0,
            estimated_bearing: 0.0,
            lateral_velocity: 0.0,
            range_velocity: 0.0,
            last_seen_timestamp: None,
            confidence_decay: 0.0,
            status: TargetStatus::Lost,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.status == TargetStatus::Lost
    }

    /// Angular rate of the bearing implied by the lateral velocity.
    pub fn bearing_rate(&self) -> f32 {
        if self.estimated_range > f32::EPSILON {
            self.lateral_velocity / self.estimated_range
        } else {
            0.0
        }
    }
}

/// Last smoothed fix, the origin for finite differences and dead-reckoning.
#[derive(Debug, Clone, Copy)]
struct Fix {
    range: f32,
    bearing: f32,
    range_velocity: f32,
    lateral_velocity: f32,
    timestamp: f64,
}

/// Turns per-frame detections into a smoothed [`TargetState`].
pub struct TargetEstimator {
    config: EstimatorConfig,
    model: DistanceBearingModel,
    smoother: ExpSmoother,
    target_loss_timeout: f64,
    fix: Option<Fix>,
    state: TargetState,
}

impl TargetEstimator {
    pub fn new(
        config: EstimatorConfig,
        model: DistanceBearingModel,
        target_loss_timeout: f64,
    ) -> Self {
        let smoother = ExpSmoother::new(config.smoothing_time_constant);
        Self {
            config,
            model,
            smoother,
            target_loss_timeout,
            fix: None,
            state: TargetState::unacquired(),
        }
    }

    pub fn state(&self) -> &TargetState {
        &self.state
    }

    pub fn model(&self) -> &DistanceBearingModel {
        &self.model
    }

    /// Forgets the target. Used on mission restart.
    pub fn reset(&mut self, target_loss_timeout: f64) {
        self.target_loss_timeout = target_loss_timeout;
        self.fix = None;
        self.state = TargetState::unacquired();
    }

    pub fn update(&mut self, detection: Option<&Detection>, now: f64) -> TargetState {
        let measurement = detection.and_then(|d| self.accept(d, now));
        self.state = match measurement {
            Some((measured, timestamp)) => self.apply_fix(measured, timestamp),
            None => self.coast(now),
        };
        self.state
    }

    /// Validates a detection and converts it to range/bearing. `None` means
    /// the detection counts as absent for this tick.
    fn accept(&self, detection: &Detection, now: f64) -> Option<(RangeBearing, f64)> {
        let confidence = detection.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            warn!("rejecting detection with malformed confidence {}", confidence);
            return None;
        }
        if !detection.timestamp.is_finite() || detection.timestamp > now {
            warn!(
                "rejecting detection stamped {} at tick {}",
                detection.timestamp, now
            );
            return None;
        }
        if let Some(fix) = self.fix {
            if detection.timestamp <= fix.timestamp {
                debug!(
                    "ignoring detection stamped {} not newer than {}",
                    detection.timestamp, fix.timestamp
                );
                return None;
            }
        }
        if confidence < self.config.min_confidence {
            trace!("detection confidence {:.2} below minimum", confidence);
            return None;
        }

        match self.model.estimate(&detection.bbox) {
            Ok(measured) => Some((measured, detection.timestamp)),
            Err(err) => {
                debug!("treating detection as absent: {}", err);
                None
            }
        }
    }

    fn apply_fix(&mut self, measured: RangeBearing, timestamp: f64) -> TargetState {
        let fix = match self.fix {
            Some(previous) if !self.state.is_lost() => {
                let dt = timestamp - previous.timestamp;
                let alpha = self.smoother.alpha(dt);
                let range = self.smoother.blend(previous.range, measured.range, dt);
                let bearing = wrap_angle(
                    previous.bearing + alpha * wrap_angle(measured.bearing - previous.bearing),
                );
                let dt = dt as f32;
                Fix {
                    range,
                    bearing,
                    range_velocity: (range - previous.range) / dt,
                    lateral_velocity: range * wrap_angle(bearing - previous.bearing) / dt,
                    timestamp,
                }
            }
            _ => {
                debug!(
                    "target fix initialised at range {:.2} m bearing {:.3} rad",
                    measured.range, measured.bearing
                );
                Fix {
                    range: measured.range,
                    bearing: measured.bearing,
                    range_velocity: 0.0,
                    lateral_velocity: 0.0,
                    timestamp,
                }
            }
        };
        self.fix = Some(fix);

        TargetState {
            estimated_range: fix.range,
            estimated_bearing: fix.bearing,
            lateral_velocity: fix.lateral_velocity,
            range_velocity: fix.range_velocity,
            last_seen_timestamp: Some(timestamp),
            confidence_decay: 0.0,
            status: TargetStatus::Tracked,
        }
    }

    fn coast(&self, now: f64) -> TargetState {
        let Some(fix) = self.fix else {
            return TargetState::unacquired();
        };

        let elapsed = (now - fix.timestamp).max(0.0);
        let lost = elapsed > self.target_loss_timeout;
        let horizon = elapsed.min(self.target_loss_timeout) as f32;

        let bearing_rate = if fix.range > f32::EPSILON {
            fix.lateral_velocity / fix.range
        } else {
            0.0
        };
        let range = (fix.range + fix.range_velocity * horizon).max(0.0);
        let bearing = wrap_angle(fix.bearing + bearing_rate * horizon);

        if lost && !self.state.is_lost() {
            debug!("target lost after {:.2} s without detection", elapsed);
        }

        TargetState {
            estimated_range: range,
            estimated_bearing: bearing,
            lateral_velocity: if lost { 0.0 } else { fix.lateral_velocity },
            range_velocity: if lost { 0.0 } else { fix.range_velocity },
            last_seen_timestamp: Some(fix.timestamp),
            confidence_decay: self.config.decay_rate * elapsed as f32,
            status: if lost {
                TargetStatus::Lost
            } else {
                TargetStatus::Coasting
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::estimation::geometry;

    pub fn estimator_config() -> EstimatorConfig {
        EstimatorConfig {
            smoothing_time_constant: 0.2,
            min_confidence: 0.4,
            decay_rate: 0.5,
        }
    }

    pub fn estimator(target_loss_timeout: f64) -> TargetEstimator {
        let model = DistanceBearingModel::new(geometry::fixtures::camera()).unwrap();
        TargetEstimator::new(estimator_config(), model, target_loss_timeout)
    }

    /// Detection of a subject at the given range and bearing.
    pub fn detection_at(
        estimator: &TargetEstimator,
        range: f32,
        bearing: f32,
        timestamp: f64,
    ) -> Detection {
        Detection::new(estimator.model().project(range, bearing), 0.9, timestamp)
    }
}
