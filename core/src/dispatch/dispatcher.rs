use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::{FailsafeAction, FollowConfig};
use crate::interface::protocol::VELOCITY_YAW_RATE_TYPE_MASK;
use crate::interface::{
    ControlCommand, CoordinateFrame, FirmwareMode, FlightMode, ProtocolMessage, Telemetry,
    VelocitySetpoint,
};
use crate::math::{clamp_norm, clamp_symmetric};
use crate::prelude::{FollowError, FollowResult};

/// Fraction of the protocol period a message may run ahead of its slot.
/// Absorbs scheduler jitter when the tick rate equals the protocol rate.
const EARLY_TOLERANCE: f64 = 0.2;

/// Linear speed derating below a battery level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatteryDerating {
    /// Battery fraction below which the speed limit starts shrinking.
    pub start_level: f32,
    /// Fraction of `max_speed` still allowed at an empty battery.
    pub min_factor: f32,
}

impl BatteryDerating {
    pub fn factor(&self, battery_level: f32) -> f32 {
        if battery_level >= self.start_level {
            return 1.0;
        }
        let fraction = (battery_level / self.start_level).clamp(0.0, 1.0);
        self.min_factor + (1.0 - self.min_factor) * fraction
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Highest message rate the firmware link accepts.
    pub protocol_rate_hz: f64,
    /// Commands older than this many seconds are refused.
    pub staleness_bound: f64,
    #[serde(default)]
    pub battery_derating: Option<BatteryDerating>,
}

impl DispatchConfig {
    pub fn validate(&self) -> FollowResult<()> {
        if !self.protocol_rate_hz.is_finite() || self.protocol_rate_hz <= 0.0 {
            return Err(FollowError::InvalidConfig(
                "protocol_rate_hz must be positive".into(),
            ));
        }
        if !self.staleness_bound.is_finite() || self.staleness_bound < 0.0 {
            return Err(FollowError::InvalidConfig(
                "staleness_bound must be non-negative".into(),
            ));
        }
        if let Some(derating) = &self.battery_derating {
            let valid = (0.0..=1.0).contains(&derating.start_level)
                && derating.start_level > 0.0
                && (0.0..=1.0).contains(&derating.min_factor);
            if !valid {
                return Err(FollowError::InvalidConfig(
                    "battery_derating levels must be fractions in [0, 1]".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Translates controller commands into firmware messages.
///
/// Every outgoing velocity setpoint is checked for staleness, clamped to the
/// telemetry-derived envelope and paced to the firmware's cadence. FAILSAFE
/// commands turn into a firmware mode change that is sent immediately and
/// then repeated at the protocol cadence.
pub struct CommandDispatcher {
    config: DispatchConfig,
    max_speed: f32,
    max_yaw_rate: f32,
    failsafe_action: FailsafeAction,
    /// Ideal time of the next send slot.
    next_due: Option<f64>,
    failsafe_announced: bool,
}

impl CommandDispatcher {
    pub fn new(config: DispatchConfig, follow: &FollowConfig) -> FollowResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            max_speed: follow.max_speed,
            max_yaw_rate: follow.max_yaw_rate,
            failsafe_action: follow.failsafe_action,
            next_due: None,
            failsafe_announced: false,
        })
    }

    /// Picks up new limits for a restarted mission.
    pub fn reset(&mut self, follow: &FollowConfig) {
        self.max_speed = follow.max_speed;
        self.max_yaw_rate = follow.max_yaw_rate;
        self.failsafe_action = follow.failsafe_action;
        self.next_due = None;
        self.failsafe_announced = false;
    }

    pub fn period(&self) -> f64 {
        1.0 / self.config.protocol_rate_hz
    }

    /// Speed limit after battery derating.
    pub fn speed_limit(&self, telemetry: &Telemetry) -> f32 {
        let factor = self
            .config
            .battery_derating
            .map(|derating| derating.factor(telemetry.battery_level))
            .unwrap_or(1.0);
        self.max_speed * factor
    }

    /// Returns `Ok(None)` when the command is throttled by the rate limiter.
    pub fn dispatch(
        &mut self,
        command: &ControlCommand,
        telemetry: Option<&Telemetry>,
        now: f64,
    ) -> FollowResult<Option<ProtocolMessage>> {
        if command.mode == FlightMode::Failsafe {
            return Ok(self.dispatch_failsafe(now));
        }

        let age = now - command.issued_at;
        if age > self.config.staleness_bound {
            warn!(
                "rejecting {} command issued {:.3} s ago",
                command.mode.name(),
                age
            );
            return Err(FollowError::ProtocolRejection(format!(
                "command is {:.3} s old (bound {:.3} s)",
                age, self.config.staleness_bound
            )));
        }
        if !command.is_finite() {
            warn!("rejecting non-finite command {:?}", command);
            return Err(FollowError::ProtocolRejection(
                "command contains non-finite values".into(),
            ));
        }
        let Some(telemetry) = telemetry else {
            warn!("rejecting command without telemetry to derive limits");
            return Err(FollowError::ProtocolRejection(
                "no telemetry available for envelope check".into(),
            ));
        };

        if !self.is_due(now) {
            trace!("throttled {} command at {:.3}", command.mode.name(), now);
            return Ok(None);
        }

        let speed_limit = self.speed_limit(telemetry);
        let velocity = clamp_norm(command.desired_velocity, speed_limit);
        let yaw_rate = clamp_symmetric(command.desired_yaw_rate, self.max_yaw_rate);
        if velocity != command.desired_velocity || yaw_rate != command.desired_yaw_rate {
            debug!(
                "clamped command to {:.2} m/s, {:.2} rad/s",
                speed_limit, self.max_yaw_rate
            );
        }

        self.schedule_after(now);
        Ok(Some(ProtocolMessage::Velocity(VelocitySetpoint {
            time_boot_ms: boot_millis(now),
            frame: CoordinateFrame::BodyNed,
            type_mask: VELOCITY_YAW_RATE_TYPE_MASK,
            vx: velocity.x,
            vy: velocity.y,
            vz: velocity.z,
            yaw_rate,
        })))
    }

    fn dispatch_failsafe(&mut self, now: f64) -> Option<ProtocolMessage> {
        if self.failsafe_announced && !self.is_due(now) {
            return None;
        }
        if self.failsafe_announced {
            self.schedule_after(now);
        } else {
            error!("requesting firmware {:?} for failsafe", self.firmware_mode());
            self.failsafe_announced = true;
            self.next_due = Some(now + self.period());
        }
        Some(ProtocolMessage::SetMode {
            mode: self.firmware_mode(),
            time_boot_ms: boot_millis(now),
        })
    }

    fn firmware_mode(&self) -> FirmwareMode {
        match self.failsafe_action {
            FailsafeAction::Hold => FirmwareMode::Loiter,
            FailsafeAction::Land => FirmwareMode::Land,
            FailsafeAction::ReturnToHome => FirmwareMode::ReturnToLaunch,
        }
    }

    fn is_due(&self, now: f64) -> bool {
        match self.next_due {
            Some(due) => now + EARLY_TOLERANCE * self.period() >= due,
            None => true,
        }
    }

    /// Advances the send schedule from the slot just used, so jitter in the
    /// actual send times does not accumulate. Restarts from `now` after a
    /// gap longer than one period.
    fn schedule_after(&mut self, now: f64) {
        let period = self.period();
        let earliest = now + period * (1.0 - EARLY_TOLERANCE);
        self.next_due = Some(match self.next_due {
            Some(due) if now <= due + period => (due + period).max(earliest),
            _ => now + period,
        });
    }
}

fn boot_millis(now: f64) -> u32 {
    (now.max(0.0) * 1000.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::follow_config;
    use crate::control::fixtures::telemetry;
    use nalgebra::Vector3;

    fn dispatch_config() -> DispatchConfig {
        DispatchConfig {
            protocol_rate_hz: 10.0,
            staleness_bound: 0.05,
            battery_derating: None,
        }
    }

    fn dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(dispatch_config(), &follow_config()).unwrap()
    }

    fn command(velocity: Vector3<f32>, yaw_rate: f32, issued_at: f64) -> ControlCommand {
        ControlCommand {
            desired_velocity: velocity,
            desired_yaw_rate: yaw_rate,
            mode: FlightMode::Tracking,
            issued_at,
        }
    }

    fn setpoint(message: Option<ProtocolMessage>) -> VelocitySetpoint {
        match message {
            Some(ProtocolMessage::Velocity(setpoint)) => setpoint,
            other => panic!("expected velocity setpoint, got {:?}", other),
        }
    }

    #[test]
    fn in_envelope_command_passes_through() {
        let mut dispatcher = dispatcher();
        let sent = dispatcher
            .dispatch(&command(Vector3::new(1.0, -0.5, 0.0), 0.3, 1.0), Some(&telemetry()), 1.0)
            .unwrap();
        let setpoint = setpoint(sent);
        assert_eq!((setpoint.vx, setpoint.vy, setpoint.yaw_rate), (1.0, -0.5, 0.3));
        assert_eq!(setpoint.frame, CoordinateFrame::BodyNed);
        assert_eq!(setpoint.type_mask, VELOCITY_YAW_RATE_TYPE_MASK);
        assert_eq!(setpoint.time_boot_ms, 1000);
    }

    #[test]
    fn over_limit_command_is_clamped_to_exactly_the_limit() {
        let mut dispatcher = dispatcher();
        let sent = dispatcher
            .dispatch(&command(Vector3::new(6.0, 8.0, 0.0), -3.0, 0.0), Some(&telemetry()), 0.0)
            .unwrap();
        let setpoint = setpoint(sent);
        let speed = Vector3::new(setpoint.vx, setpoint.vy, setpoint.vz).norm();
        assert!((speed - 4.0).abs() < 1e-5);
        assert!((setpoint.vx / setpoint.vy - 0.75).abs() < 1e-5);
        assert_eq!(setpoint.yaw_rate, -1.0);
    }

    #[test]
    fn low_battery_derates_speed_limit() {
        let mut config = dispatch_config();
        config.battery_derating = Some(BatteryDerating {
            start_level: 0.5,
            min_factor: 0.5,
        });
        let mut dispatcher = CommandDispatcher::new(config, &follow_config()).unwrap();
        let mut drained = telemetry();
        drained.battery_level = 0.25;
        assert!((dispatcher.speed_limit(&drained) - 3.0).abs() < 1e-5);

        let sent = dispatcher
            .dispatch(&command(Vector3::new(4.0, 0.0, 0.0), 0.0, 0.0), Some(&drained), 0.0)
            .unwrap();
        assert!((setpoint(sent).vx - 3.0).abs() < 1e-5);
        assert_eq!(dispatcher.speed_limit(&telemetry()), 4.0);
    }

    #[test]
    fn commands_faster_than_protocol_rate_are_throttled() {
        let mut dispatcher = dispatcher();
        let snapshot = telemetry();
        let forward = Vector3::new(1.0, 0.0, 0.0);
        assert!(dispatcher.dispatch(&command(forward, 0.0, 0.0), Some(&snapshot), 0.0).unwrap().is_some());
        assert!(dispatcher.dispatch(&command(forward, 0.0, 0.05), Some(&snapshot), 0.05).unwrap().is_none());
        assert!(dispatcher.dispatch(&command(forward, 0.0, 0.1), Some(&snapshot), 0.1).unwrap().is_some());
    }

    #[test]
    fn jittered_ticks_at_the_protocol_rate_are_all_sent() {
        let mut dispatcher = dispatcher();
        let snapshot = telemetry();
        let forward = Vector3::new(1.0, 0.0, 0.0);
        for now in [0.003, 0.1, 0.2005, 0.2999, 0.401, 0.4985] {
            let sent = dispatcher.dispatch(&command(forward, 0.0, now), Some(&snapshot), now).unwrap();
            assert!(sent.is_some(), "throttled at {}", now);
        }
        // A burst between slots is still throttled.
        assert!(dispatcher.dispatch(&command(forward, 0.0, 0.52), Some(&snapshot), 0.52).unwrap().is_none());
    }

    #[test]
    fn stale_command_is_rejected() {
        let mut dispatcher = dispatcher();
        let result = dispatcher.dispatch(&command(Vector3::zeros(), 0.0, 1.0), Some(&telemetry()), 1.2);
        assert!(matches!(result, Err(FollowError::ProtocolRejection(_))));
    }

    #[test]
    fn missing_telemetry_or_non_finite_values_are_rejected() {
        let mut dispatcher = dispatcher();
        assert!(dispatcher
            .dispatch(&command(Vector3::zeros(), 0.0, 0.0), None, 0.0)
            .is_err());
        assert!(dispatcher
            .dispatch(&command(Vector3::new(f32::NAN, 0.0, 0.0), 0.0, 0.0), Some(&telemetry()), 0.0)
            .is_err());
    }

    #[test]
    fn failsafe_mode_change_bypasses_rate_limit_then_repeats_at_cadence() {
        let mut dispatcher = dispatcher();
        let snapshot = telemetry();
        dispatcher
            .dispatch(&command(Vector3::zeros(), 0.0, 0.0), Some(&snapshot), 0.0)
            .unwrap();

        let failsafe = ControlCommand::hold(FlightMode::Failsafe, 0.02);
        let first = dispatcher.dispatch(&failsafe, None, 0.02).unwrap();
        assert_eq!(
            first,
            Some(ProtocolMessage::SetMode {
                mode: FirmwareMode::Land,
                time_boot_ms: 20,
            })
        );
        assert_eq!(dispatcher.dispatch(&failsafe, None, 0.07).unwrap(), None);
        assert!(matches!(
            dispatcher.dispatch(&failsafe, None, 0.12).unwrap(),
            Some(ProtocolMessage::SetMode { .. })
        ));
    }

    #[test]
    fn failsafe_action_maps_to_firmware_mode() {
        for (action, expected) in [
            (FailsafeAction::Hold, FirmwareMode::Loiter),
            (FailsafeAction::ReturnToHome, FirmwareMode::ReturnToLaunch),
        ] {
            let mut follow = follow_config();
            follow.failsafe_action = action;
            let mut dispatcher = CommandDispatcher::new(dispatch_config(), &follow).unwrap();
            let message = dispatcher
                .dispatch(&ControlCommand::hold(FlightMode::Failsafe, 0.0), None, 0.0)
                .unwrap();
            assert!(matches!(message, Some(ProtocolMessage::SetMode { mode, .. }) if mode == expected));
        }
    }

    #[test]
    fn invalid_dispatch_config_is_rejected() {
        let mut config = dispatch_config();
        config.protocol_rate_hz = 0.0;
        assert!(CommandDispatcher::new(config, &follow_config()).is_err());
    }
}
