use serde::{Deserialize, Serialize};

use crate::interface::GpsFix;
use crate::prelude::{FollowError, FollowResult};

/// Terminal behaviour executed by the firmware once FAILSAFE is entered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailsafeAction {
    Hold,
    Land,
    ReturnToHome,
}

/// How the controller treats a sector with no fresh obstacle reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownClearancePolicy {
    /// Unknown clearance counts as "too close".
    Block,
    /// Unknown clearance never triggers avoidance.
    Allow,
}

/// Gains of the tracking control law.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlGains {
    /// Forward speed per metre of range error (1/s).
    pub range_p: f32,
    /// Forward speed per m/s of range rate.
    pub range_d: f32,
    /// Yaw rate per radian of bearing error (1/s).
    pub bearing_p: f32,
    /// Yaw rate per rad/s of bearing rate.
    pub bearing_d: f32,
    /// Lateral speed per m/s of target lateral velocity.
    pub lateral_ff: f32,
    /// Vertical speed per metre of altitude error, used with `target_altitude`.
    #[serde(default)]
    pub altitude_p: f32,
}

/// Mission-wide follow parameters. Immutable for a session; replaced only on
/// mission restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowConfig {
    pub target_distance: f32,
    /// Range error within which the vehicle holds its distance instead of
    /// correcting it.
    #[serde(default)]
    pub distance_tolerance: f32,
    pub target_bearing_offset: f32,
    pub max_speed: f32,
    pub max_yaw_rate: f32,
    pub min_clearance_margin: f32,
    pub target_loss_timeout: f64,
    pub failsafe_action: FailsafeAction,

    pub gains: ControlGains,
    /// Extra clearance beyond the margin required before leaving AVOIDING.
    pub clearance_hysteresis: f32,
    /// Speed of the escape vector while AVOIDING.
    pub avoidance_speed: f32,
    pub unknown_clearance: UnknownClearancePolicy,
    /// Time the decay must stay under threshold before ACQUIRING -> TRACKING.
    pub acquire_dwell: f64,
    /// Decay below which the target counts as confirmed. Above it ACQUIRING
    /// restarts its dwell and TRACKING drops to HOLDING.
    pub confirm_decay_threshold: f32,
    /// Time since the target was last seen after which HOLDING gives up.
    pub holding_timeout: f64,
    pub critical_battery_level: f32,
    pub min_gps_fix: GpsFix,
    #[serde(default)]
    pub target_altitude: Option<f32>,
}

impl FollowConfig {
    pub fn validate(&self) -> FollowResult<()> {
        let positive = [
            ("target_distance", self.target_distance),
            ("max_speed", self.max_speed),
            ("max_yaw_rate", self.max_yaw_rate),
            ("min_clearance_margin", self.min_clearance_margin),
            ("avoidance_speed", self.avoidance_speed),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(FollowError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let non_negative = [
            ("target_loss_timeout", self.target_loss_timeout),
            ("acquire_dwell", self.acquire_dwell),
            ("holding_timeout", self.holding_timeout),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(FollowError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }

        if !self.distance_tolerance.is_finite() || self.distance_tolerance < 0.0 {
            return Err(FollowError::InvalidConfig(
                "distance_tolerance must be non-negative".into(),
            ));
        }
        if !self.clearance_hysteresis.is_finite() || self.clearance_hysteresis < 0.0 {
            return Err(FollowError::InvalidConfig(
                "clearance_hysteresis must be non-negative".into(),
            ));
        }
        if !self.target_bearing_offset.is_finite()
            || self.target_bearing_offset.abs() > std::f32::consts::PI
        {
            return Err(FollowError::InvalidConfig(
                "target_bearing_offset must lie within [-pi, pi]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.critical_battery_level) {
            return Err(FollowError::InvalidConfig(
                "critical_battery_level must be a fraction in [0, 1]".into(),
            ));
        }
        if !self.confirm_decay_threshold.is_finite() || self.confirm_decay_threshold <= 0.0 {
            return Err(FollowError::InvalidConfig(
                "confirm_decay_threshold must be positive".into(),
            ));
        }
        let gains = &self.gains;
        let all_gains = [
            gains.range_p,
            gains.range_d,
            gains.bearing_p,
            gains.bearing_d,
            gains.lateral_ff,
            gains.altitude_p,
        ];
        if all_gains.iter().any(|g| !g.is_finite() || *g < 0.0) {
            return Err(FollowError::InvalidConfig(
                "control gains must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}
