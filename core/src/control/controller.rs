use log::{debug, error, info};
use nalgebra::{Vector2, Vector3};

use crate::config::FollowConfig;
use crate::control::law::TrackingLaw;
use crate::estimation::{ObstacleMap, TargetState};
use crate::interface::{ControlCommand, FlightMode, Telemetry};
use crate::math::{clamp_norm, clamp_symmetric};
use crate::prelude::{ControlLaw, CriticalFault, FollowResult};

/// Commanded or measured horizontal speed below which the vehicle is
/// considered stationary and has no direction of travel.
const STATIONARY_SPEED: f32 = 1e-3;

/// Read-only snapshot handed to the controller each tick.
#[derive(Debug, Clone, Copy)]
pub struct ControlInputs<'a> {
    pub target: &'a TargetState,
    /// `None` when no fresh telemetry arrived this tick.
    pub telemetry: Option<&'a Telemetry>,
    pub obstacles: &'a ObstacleMap,
    pub abort: bool,
    pub now: f64,
}

/// Sector that pushed the controller into AVOIDING.
#[derive(Debug, Clone, Copy)]
struct Avoidance {
    sector: usize,
}

/// Follow state machine and control-law host.
///
/// The tracking modes (SEARCHING, ACQUIRING, TRACKING, HOLDING) evolve in a
/// single transition function every tick. AVOIDING overlays whichever
/// tracking mode is underneath and hands back to it once clear. FAILSAFE
/// latches until [`reset`](Self::reset).
pub struct FollowController<L: ControlLaw = TrackingLaw> {
    config: FollowConfig,
    law: L,
    base_mode: FlightMode,
    avoidance: Option<Avoidance>,
    failsafe: Option<CriticalFault>,
    acquire_since: Option<f64>,
    holding_since: Option<f64>,
    missed_telemetry: u32,
    last_telemetry: Option<Telemetry>,
}

impl FollowController<TrackingLaw> {
    pub fn new(config: FollowConfig) -> FollowResult<Self> {
        let law = TrackingLaw::new(config.clone());
        Self::with_law(config, law)
    }

    /// Starts a new mission with a replacement configuration.
    pub fn reset(&mut self, config: FollowConfig) -> FollowResult<()> {
        *self = Self::new(config)?;
        Ok(())
    }
}

impl<L: ControlLaw> FollowController<L> {
    pub fn with_law(config: FollowConfig, law: L) -> FollowResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            law,
            base_mode: FlightMode::Searching,
            avoidance: None,
            failsafe: None,
            acquire_since: None,
            holding_since: None,
            missed_telemetry: 0,
            last_telemetry: None,
        })
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    pub fn mode(&self) -> FlightMode {
        if self.failsafe.is_some() {
            FlightMode::Failsafe
        } else if self.avoidance.is_some() {
            FlightMode::Avoiding
        } else {
            self.base_mode
        }
    }

    pub fn failsafe_cause(&self) -> Option<CriticalFault> {
        self.failsafe
    }

    /// Latches FAILSAFE from outside the state machine (fault accumulation
    /// in the supervisor). Returns the failsafe command for this tick.
    pub fn force_failsafe(&mut self, fault: CriticalFault, now: f64) -> ControlCommand {
        self.enter_failsafe(fault);
        ControlCommand::hold(FlightMode::Failsafe, now)
    }

    /// Evaluates one tick of the state machine and returns its command.
    pub fn step(&mut self, inputs: ControlInputs<'_>) -> ControlCommand {
        let now = inputs.now;
        if self.failsafe.is_some() {
            return ControlCommand::hold(FlightMode::Failsafe, now);
        }
        if inputs.abort {
            return self.force_failsafe(CriticalFault::Abort, now);
        }

        let telemetry = match inputs.telemetry {
            Some(fresh) => {
                self.missed_telemetry = 0;
                self.last_telemetry = Some(*fresh);
                *fresh
            }
            None => {
                self.missed_telemetry += 1;
                if self.missed_telemetry > 1 {
                    let fault = CriticalFault::TelemetryTimeout {
                        missed_ticks: self.missed_telemetry,
                    };
                    return self.force_failsafe(fault, now);
                }
                debug!("telemetry missing this tick, reusing last snapshot");
                match self.last_telemetry {
                    Some(previous) => previous,
                    None => return ControlCommand::hold(self.mode(), now),
                }
            }
        };

        if let Some(fault) = self.check_vehicle(&telemetry) {
            return self.force_failsafe(fault, now);
        }

        if let Some(fault) = self.transition(inputs.target, now) {
            return self.force_failsafe(fault, now);
        }

        let tracking_command = match self.base_mode {
            FlightMode::Tracking | FlightMode::Acquiring => {
                let mut command = self.law.compute(inputs.target, &telemetry, now);
                command.mode = self.base_mode;
                self.limit(command)
            }
            _ => ControlCommand::hold(self.base_mode, now),
        };

        match self.avoidance {
            Some(avoidance) => self.continue_avoiding(avoidance, inputs.obstacles, now),
            None => self.gate(tracking_command, &telemetry, inputs.obstacles),
        }
    }

    fn check_vehicle(&self, telemetry: &Telemetry) -> Option<CriticalFault> {
        if telemetry.battery_level <= self.config.critical_battery_level {
            return Some(CriticalFault::CriticalBattery {
                level: telemetry.battery_level,
            });
        }
        if telemetry.gps_fix < self.config.min_gps_fix {
            return Some(CriticalFault::GpsFixLost);
        }
        None
    }

    /// Advances the tracking mode. Returns a fault when HOLDING times out.
    fn transition(&mut self, target: &TargetState, now: f64) -> Option<CriticalFault> {
        let confirmed = !target.is_lost() && target.confidence_decay < self.config.confirm_decay_threshold;

        match self.base_mode {
            FlightMode::Searching => {
                if !target.is_lost() {
                    self.acquire_since = confirmed.then_some(now);
                    self.set_base_mode(FlightMode::Acquiring, "target detected");
                }
            }
            FlightMode::Acquiring => {
                if target.is_lost() {
                    self.acquire_since = None;
                    self.set_base_mode(FlightMode::Searching, "target lost while acquiring");
                } else if !confirmed {
                    self.acquire_since = None;
                } else {
                    let since = *self.acquire_since.get_or_insert(now);
                    if now - since >= self.config.acquire_dwell {
                        self.acquire_since = None;
                        self.set_base_mode(FlightMode::Tracking, "target confirmed");
                    }
                }
            }
            FlightMode::Tracking => {
                if !confirmed {
                    self.holding_since = Some(target.last_seen_timestamp.unwrap_or(now));
                    let reason = if target.is_lost() {
                        "target lost"
                    } else {
                        "target unconfirmed"
                    };
                    self.set_base_mode(FlightMode::Holding, reason);
                }
            }
            FlightMode::Holding => {
                if confirmed {
                    self.holding_since = None;
                    self.set_base_mode(FlightMode::Tracking, "target reacquired");
                } else {
                    let since = *self.holding_since.get_or_insert(now);
                    if now - since > self.config.holding_timeout {
                        return Some(CriticalFault::HoldingTimeout);
                    }
                }
            }
            FlightMode::Avoiding | FlightMode::Failsafe => {}
        }
        None
    }

    /// Checks the direction of travel against the obstacle map and either
    /// passes the tracking command through or starts avoiding.
    fn gate(
        &mut self,
        command: ControlCommand,
        telemetry: &Telemetry,
        obstacles: &ObstacleMap,
    ) -> ControlCommand {
        let may_avoid = matches!(
            self.base_mode,
            FlightMode::Tracking | FlightMode::Acquiring | FlightMode::Holding
        );
        if !may_avoid {
            return command;
        }
        let Some(bearing) = travel_bearing(&command, telemetry) else {
            return command;
        };

        let sector = obstacles.sector_for_bearing(bearing);
        let clearance = obstacles.clearance(sector);
        if !clearance.is_below(self.config.min_clearance_margin, self.config.unknown_clearance) {
            return command;
        }

        info!(
            "mode {} -> AVOIDING (sector {} clearance {:?})",
            self.base_mode.name(),
            sector,
            clearance
        );
        let avoidance = Avoidance { sector };
        self.avoidance = Some(avoidance);
        self.avoid(avoidance, obstacles, command.issued_at)
    }

    fn continue_avoiding(
        &mut self,
        avoidance: Avoidance,
        obstacles: &ObstacleMap,
        now: f64,
    ) -> ControlCommand {
        let release = self.config.min_clearance_margin + self.config.clearance_hysteresis;
        let clearance = obstacles.clearance(avoidance.sector);
        if clearance.is_clear_of(release, self.config.unknown_clearance) {
            self.avoidance = None;
            info!(
                "mode AVOIDING -> {} (sector {} clear: {:?})",
                self.base_mode.name(),
                avoidance.sector,
                clearance
            );
            return ControlCommand::hold(self.base_mode, now);
        }
        self.avoid(avoidance, obstacles, now)
    }

    /// Escape vector: repulsion from every sector inside the release
    /// distance, weighted by how deep the obstacle intrudes, with any
    /// component toward the triggering sector removed.
    fn avoid(&self, avoidance: Avoidance, obstacles: &ObstacleMap, now: f64) -> ControlCommand {
        let release = self.config.min_clearance_margin + self.config.clearance_hysteresis;
        let toward = |sector: usize| {
            let bearing = obstacles.sector_bearing(sector);
            Vector2::new(bearing.cos(), bearing.sin())
        };
        let trigger = toward(avoidance.sector);

        let mut escape = -trigger * release;
        for (sector, distance) in obstacles.sectors_below(release) {
            if sector != avoidance.sector {
                escape -= toward(sector) * (release - distance);
            }
        }
        let along = escape.dot(&trigger);
        if along > 0.0 {
            escape -= trigger * along;
        }
        let direction = if escape.norm() > STATIONARY_SPEED {
            escape.normalize()
        } else {
            -trigger
        };
        let escape = direction * self.config.avoidance_speed;

        self.limit(ControlCommand {
            desired_velocity: Vector3::new(escape.x, escape.y, 0.0),
            desired_yaw_rate: 0.0,
            mode: FlightMode::Avoiding,
            issued_at: now,
        })
    }

    fn limit(&self, mut command: ControlCommand) -> ControlCommand {
        command.desired_velocity = clamp_norm(command.desired_velocity, self.config.max_speed);
        command.desired_yaw_rate = clamp_symmetric(command.desired_yaw_rate, self.config.max_yaw_rate);
        command
    }

    fn set_base_mode(&mut self, next: FlightMode, reason: &str) {
        if next != self.base_mode {
            info!("mode {} -> {} ({})", self.base_mode.name(), next.name(), reason);
            self.base_mode = next;
        }
    }

    fn enter_failsafe(&mut self, fault: CriticalFault) {
        if self.failsafe.is_none() {
            error!(
                "mode {} -> FAILSAFE: {} (action {:?})",
                self.mode().name(),
                fault,
                self.config.failsafe_action
            );
            self.failsafe = Some(fault);
            self.avoidance = None;
        }
    }
}

/// Body-frame bearing of travel: the commanded horizontal velocity, or the
/// measured drift when the command is stationary.
fn travel_bearing(command: &ControlCommand, telemetry: &Telemetry) -> Option<f32> {
    let commanded = command.desired_velocity;
    if commanded.xy().norm() > STATIONARY_SPEED {
        return Some(commanded.y.atan2(commanded.x));
    }
    let (forward, right) = telemetry.body_horizontal_velocity();
    if forward.hypot(right) > STATIONARY_SPEED {
        return Some(right.atan2(forward));
    }
    None
}
